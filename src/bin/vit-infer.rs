//! Classify one image with a trained Vision Transformer
//!
//! ## Usage
//!
//! ```bash
//! # Probe image (white square on black)
//! cargo run --release --bin vit-infer -- models/vit_1718000000.txt
//!
//! # First sample of a CSV file, compared against its label
//! cargo run --release --bin vit-infer -- models/vit_1718000000.txt mnist_test.csv
//! ```

use clap::Parser;
use tinyvit::train::{probe_image, IMAGE_SIDE};
use tinyvit::{load_model, Dataset, Tensor};

#[derive(Parser)]
#[command(name = "vit-infer", about = "Classify an image with a trained Vision Transformer")]
struct Args {
    /// Model file written by vit-train
    model: String,

    /// CSV file whose first sample is classified; a generated image is used if omitted
    image_csv: Option<String>,

    /// Rows with a label at or above this are skipped when reading the CSV
    #[arg(long, default_value = "10")]
    num_classes: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (image, true_label) = load_image(args.image_csv.as_deref(), args.num_classes);

    println!("\nRunning inference with model: {}", args.model);
    let mut model = load_model(&args.model)?;

    let separator = "-".repeat(33);
    match model.try_predict(&image) {
        Ok(prediction) => {
            println!("{separator}");
            println!("      PREDICTION COMPLETE");
            println!("{separator}");
            println!("Predicted class: {} 🎉", prediction);
            if let Some(label) = true_label {
                println!("True label: {}", label);
                if prediction == label {
                    println!("Matches the true label ✅");
                } else {
                    println!("Does not match the true label ❌");
                }
            }
            println!("{separator}");
        }
        Err(e) => {
            println!("{separator}");
            println!("  INFERENCE FAILED: {e}");
            println!("{separator}");
        }
    }

    Ok(())
}

/// First usable CSV sample, or the generated probe image when there is none
///
/// A missing or unreadable CSV is a warning, not a failure.
fn load_image(image_csv: Option<&str>, num_classes: usize) -> (Tensor, Option<usize>) {
    let Some(path) = image_csv else {
        println!("No CSV image given. Generating a simple test image (white square).");
        return (probe_image(IMAGE_SIDE), None);
    };

    let data = match Dataset::load_csv(path, Some(1), num_classes) {
        Ok(data) if !data.is_empty() => data,
        Ok(_) => {
            eprintln!("Warning: no usable image in {}. Using a generated image.", path);
            return (probe_image(IMAGE_SIDE), None);
        }
        Err(e) => {
            eprintln!("Warning: could not read {} ({}). Using a generated image.", path, e);
            return (probe_image(IMAGE_SIDE), None);
        }
    };

    let (image, label) = data.get(0);
    println!("Image loaded from: {}. True label: {}", path, label);
    (image.clone(), Some(label))
}
