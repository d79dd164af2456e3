//! End-to-end tests of the classification pipeline

use petal::layers::{Conv2d, Dense, DenseWeights, KernelBank};
use petal::{classify, image, rank, Config, Model, PetalError, Shape, Tensor};
use std::io::Write;
use std::sync::Arc;
use std::thread;

/// Deterministic pseudo-image in [0, 1]
fn test_image(shape: Shape, salt: usize) -> Tensor {
    let data = (0..shape.len())
        .map(|i| ((i * 31 + salt * 17) % 256) as f32 / 255.0)
        .collect();
    Tensor::new(data, shape).unwrap()
}

fn assert_probability_vector(probs: &[f32], classes: usize) {
    assert_eq!(probs.len(), classes);
    assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5, "sum = {}", sum);
}

#[test]
fn test_full_size_model_is_deterministic() {
    let config = Config::default();
    let model = Model::random(config.clone(), 7).unwrap();
    let img = test_image(config.input_shape(), 0);

    let first = classify(&model, &img).unwrap();
    let second = classify(&model, &img).unwrap();

    assert_probability_vector(&first, 5);
    // Bit-identical, not just close
    let first_bits: Vec<u32> = first.iter().map(|p| p.to_bits()).collect();
    let second_bits: Vec<u32> = second.iter().map(|p| p.to_bits()).collect();
    assert_eq!(first_bits, second_bits);
}

#[test]
fn test_same_seed_same_model() {
    let a = Model::random(Config::tiny(), 3).unwrap();
    let b = Model::random(Config::tiny(), 3).unwrap();
    let c = Model::random(Config::tiny(), 4).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_weight_file_roundtrip_preserves_predictions() {
    let model = Model::random(Config::tiny(), 11).unwrap();
    let file = tempfile::NamedTempFile::new().unwrap();
    model.save(file.path()).unwrap();

    let loaded = Model::load(file.path()).unwrap();
    assert_eq!(loaded, model);

    let img = test_image(model.config.input_shape(), 5);
    assert_eq!(
        classify(&model, &img).unwrap(),
        classify(&loaded, &img).unwrap()
    );
}

#[test]
fn test_load_rejects_garbage() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"definitely not a weight file").unwrap();
    file.flush().unwrap();
    assert!(matches!(
        Model::load(file.path()),
        Err(PetalError::InvalidFormat(_))
    ));
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Model::load(dir.path().join("missing.petal")),
        Err(PetalError::Io(_))
    ));
}

#[test]
fn test_rgb8_file_to_ranked_labels() {
    let model = Model::random(Config::tiny(), 2).unwrap();
    let shape = model.config.input_shape();
    let pixels: Vec<u8> = (0..shape.len()).map(|i| (i % 251) as u8).collect();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&pixels).unwrap();
    file.flush().unwrap();

    let img = image::read_rgb8(file.path(), shape).unwrap();
    let probs = classify(&model, &img).unwrap();
    assert_probability_vector(&probs, 5);

    let ranked = rank(&probs, model.labels()).unwrap();
    assert_eq!(ranked.len(), 5);
    for pair in ranked.windows(2) {
        assert!(pair[0].probability >= pair[1].probability);
    }
    let mut names: Vec<&str> = ranked.iter().map(|p| p.label.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["daisy", "dandelion", "roses", "sunflowers", "tulips"]);
}

#[test]
fn test_zero_weights_give_uniform_output_and_all_labels() {
    let config = Config::tiny();
    let k = config.kernel_size;
    let mut convs = Vec::new();
    for stage in 0..4 {
        let c = config.conv_in_channels(stage);
        let n = config.conv_filters[stage];
        let bank = KernelBank::new(vec![0.0; k * k * c * n], k, k, c, n).unwrap();
        convs.push(Conv2d::new(bank, vec![0.0; n]).unwrap());
    }
    let convs: [Conv2d; 4] = convs.try_into().unwrap();
    let flat = config.flattened_len().unwrap();
    let hidden = config.dense_units;
    let first_dense = Dense::new(
        DenseWeights::new(vec![0.0; flat * hidden], flat, hidden).unwrap(),
        vec![0.0; hidden],
    )
    .unwrap();
    let labeller = Dense::new(
        DenseWeights::new(vec![0.0; hidden * 5], hidden, 5).unwrap(),
        vec![0.0; 5],
    )
    .unwrap();
    let model = Model::new(config.clone(), convs, first_dense, labeller).unwrap();

    let probs = classify(&model, &test_image(config.input_shape(), 1)).unwrap();
    for p in &probs {
        assert!((p - 0.2).abs() < 1e-6);
    }

    // Exact ties: every label survives ranking, in label order
    let ranked = rank(&probs, model.labels()).unwrap();
    let order: Vec<&str> = ranked.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(order, ["daisy", "dandelion", "roses", "sunflowers", "tulips"]);
}

#[test]
fn test_wrong_image_shape_is_rejected() {
    let model = Model::random(Config::tiny(), 0).unwrap();
    let img = Tensor::zeros(Shape::new(8, 8, 3));
    assert!(matches!(
        classify(&model, &img),
        Err(PetalError::ShapeMismatch { op: "classify", .. })
    ));
}

#[test]
fn test_shared_model_across_threads() {
    let model = Arc::new(Model::random(Config::tiny(), 9).unwrap());
    let shape = model.config.input_shape();
    let expected: Vec<Vec<f32>> = (0..4)
        .map(|salt| classify(&model, &test_image(shape, salt)).unwrap())
        .collect();

    let handles: Vec<_> = (0..4)
        .map(|salt| {
            let model = Arc::clone(&model);
            thread::spawn(move || classify(&model, &test_image(shape, salt)).unwrap())
        })
        .collect();

    for (salt, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), expected[salt]);
    }
}
