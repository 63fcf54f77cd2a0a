//! Train a Vision Transformer on MNIST-style CSV data
//!
//! ## Usage
//!
//! ```bash
//! # Reference run: 28x28, 4x4 patches, d_model 64, 2 blocks, 10 epochs
//! cargo run --release --bin vit-train -- mnist_train.csv mnist_test.csv
//!
//! # Settings from a JSON file, with CLI overrides
//! cargo run --release --bin vit-train -- mnist_train.csv mnist_test.csv \
//!     --config configs/mnist.json --epochs 3 --lr 0.001
//!
//! # Train LayerNorm parameters and embeddings too
//! cargo run --release --bin vit-train -- mnist_train.csv mnist_test.csv --exact-gradients
//! ```
//!
//! The trained model is written to `<models-dir>/vit_<unix-seconds>.txt`
//! and per-epoch metrics to `<models-dir>/vit_<unix-seconds>_log.csv`.

use clap::Parser;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};
use tinyvit::{
    evaluate, load_config, rng, save_model, train::IMAGE_SIDE, train_epoch, train_val_split,
    Dataset, GradientMode, RunConfig, TrainingLogger, VisionTransformer,
};

/// Test samples whose predictions are printed after training
const SHOWN_PREDICTIONS: usize = 15;

#[derive(Parser)]
#[command(name = "vit-train", about = "Train a Vision Transformer on MNIST CSV files")]
struct Args {
    /// Training CSV (header line, then label,pixel0..pixel783)
    train_csv: String,

    /// Test CSV, same format
    test_csv: String,

    /// JSON file with "model" and "training" sections
    #[arg(long)]
    config: Option<String>,

    // Model architecture
    /// Patch side length
    #[arg(long)]
    patch_size: Option<usize>,

    /// Embedding dimension
    #[arg(long)]
    d_model: Option<usize>,

    /// Number of transformer blocks
    #[arg(long)]
    layers: Option<usize>,

    /// Back-propagate through LayerNorm and train the embeddings
    #[arg(long)]
    exact_gradients: bool,

    // Training parameters
    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f32>,

    /// Samples per gradient step
    #[arg(long)]
    batch_size: Option<usize>,

    /// Fraction of the training CSV held out for validation
    #[arg(long)]
    val_split: Option<f32>,

    /// Random seed (0 seeds from the OS)
    #[arg(long)]
    seed: Option<u64>,

    /// Read at most this many rows from each CSV
    #[arg(long)]
    max_samples: Option<usize>,

    // Output
    /// Directory for the model file and metrics log
    #[arg(long, default_value = "models")]
    models_dir: String,
}

impl Args {
    fn resolve(&self) -> Result<RunConfig, Box<dyn std::error::Error>> {
        let mut cfg = match &self.config {
            Some(path) => load_config(path)?,
            None => RunConfig::default(),
        };

        let model = &mut cfg.model;
        model.patch_size = self.patch_size.unwrap_or(model.patch_size);
        model.d_model = self.d_model.unwrap_or(model.d_model);
        model.num_layers = self.layers.unwrap_or(model.num_layers);
        if self.exact_gradients {
            model.gradient_mode = GradientMode::Exact;
        }

        let training = &mut cfg.training;
        training.epochs = self.epochs.unwrap_or(training.epochs);
        training.learning_rate = self.lr.unwrap_or(training.learning_rate);
        training.batch_size = self.batch_size.unwrap_or(training.batch_size);
        training.val_split = self.val_split.unwrap_or(training.val_split);
        training.seed = self.seed.unwrap_or(training.seed);
        training.max_samples = self.max_samples.or(training.max_samples);

        cfg.validate()?;
        if cfg.model.image_size != IMAGE_SIDE {
            return Err(format!(
                "CSV images are {IMAGE_SIDE}x{IMAGE_SIDE}, but image_size is {}",
                cfg.model.image_size
            )
            .into());
        }
        Ok(cfg)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let cfg = args.resolve()?;
    let (model_cfg, train_cfg) = (&cfg.model, &cfg.training);

    println!("\n{}", "=".repeat(70));
    println!("  Vision Transformer with batch training");
    println!("{}", "=".repeat(70));
    println!();

    let mut rng = rng::seeded(train_cfg.seed);

    // ========================================================================
    // 1. Data
    // ========================================================================
    println!("Loading data...");
    let all_train = Dataset::load_csv(
        &args.train_csv,
        train_cfg.max_samples,
        train_cfg.num_classes_to_load,
    )?;
    let test = Dataset::load_csv(
        &args.test_csv,
        train_cfg.max_samples,
        train_cfg.num_classes_to_load,
    )?;
    let (train, val) = train_val_split(&all_train, &mut rng, train_cfg.val_split);

    // ========================================================================
    // 2. Model
    // ========================================================================
    let mut model = VisionTransformer::new(model_cfg.clone(), &mut rng)?;

    println!("\nConfiguration:");
    println!("- Image: {0}x{0}", model_cfg.image_size);
    println!("- Patch: {0}x{0}", model_cfg.patch_size);
    println!("- Patches per image: {}", model.num_patches());
    println!("- Embedding dimension (d_model): {}", model_cfg.d_model);
    println!("- Transformer blocks: {}", model_cfg.num_layers);
    println!("- Classes: {}", model_cfg.num_classes);
    println!("- Gradient mode: {:?}", model_cfg.gradient_mode);
    println!("- Parameters: {}", model.parameter_count());
    println!("- Learning rate: {}", train_cfg.learning_rate);
    println!("- Epochs: {}", train_cfg.epochs);
    println!("- Batch size: {}", train_cfg.batch_size);
    println!("- Training samples: {}", train.len());
    println!("- Validation samples: {}", val.len());
    println!("- Test samples: {}", test.len());
    println!();

    fs::create_dir_all(&args.models_dir)?;
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let model_path = format!("{}/vit_{}.txt", args.models_dir, timestamp);
    let log_path = format!("{}/vit_{}_log.csv", args.models_dir, timestamp);
    let mut logger = TrainingLogger::new(&log_path)?;

    // ========================================================================
    // 3. Training
    // ========================================================================
    println!("Training...");
    for epoch in 1..=train_cfg.epochs {
        println!("Epoch {}/{}", epoch, train_cfg.epochs);
        let train_stats = train_epoch(
            &mut model,
            &train,
            train_cfg.batch_size,
            train_cfg.learning_rate,
            &mut rng,
            true,
        );
        let val_stats = evaluate(&mut model, &val);
        logger.log(epoch, train_cfg.learning_rate, &train_stats, &val_stats)?;
        println!();
    }

    // ========================================================================
    // 4. Test set
    // ========================================================================
    println!("Final evaluation on the test set:");
    for i in 0..test.len().min(SHOWN_PREDICTIONS) {
        let (image, label) = test.get(i);
        let predicted = model.predict(image);
        println!(
            "Sample {} - Predicted: {} | Actual: {} {}",
            i,
            predicted,
            label,
            if predicted == label { "✓" } else { "✗" }
        );
    }

    let test_stats = evaluate(&mut model, &test);
    println!("\nFinal results:");
    println!(
        "- Loss: {:.4} | Accuracy: {:.2}%",
        test_stats.loss,
        test_stats.accuracy * 100.0
    );

    save_model(&model, &model_path)?;
    println!("Model saved as: {}", model_path);
    println!("Metrics written to: {}", log_path);

    Ok(())
}
