//! Datasets and Training Loop
//!
//! This module loads labelled images from CSV, splits them into
//! train/validation/test sets, and runs mini-batch training and evaluation.
//!
//! ## CSV Format
//!
//! MNIST-style files with a header line and one sample per row:
//!
//! ```text
//! label,pixel0,pixel1,...,pixel783
//! 5,0,0,...,0
//! ```
//!
//! Pixels are divided by 255 and laid out row-major in a 28x28 tensor.
//!
//! - Rows whose label is at or above `num_classes_to_load` are skipped.
//! - The label is the cell's leading digits (`5.0` reads as 5). Rows with
//!   no leading digit, including negative labels, are skipped.
//! - A short row, or a pixel cell that does not parse, stops filling that
//!   image; the remaining pixels stay zero. Bytes that are not UTF-8 make
//!   their cell unparsable rather than failing the whole file.
//!
//! ## Training
//!
//! Each batch runs `zero_grad`, then forward + backward for every sample
//! (gradients accumulate), then one `update_weights` step:
//!
//! ```text
//! Epoch 1/10
//! [==========================>                       ] 53 %
//! ```

use rand::seq::SliceRandom;
use rand::Rng;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::error::Result;
use crate::tensor::Tensor;
use crate::vit::VisionTransformer;

/// Side length of the images the CSV loader produces
pub const IMAGE_SIDE: usize = 28;

/// Pixel cells read per CSV row
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;

const PROGRESS_WIDTH: usize = 50;

/// Labelled images held in memory
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub images: Vec<Tensor>,
    pub labels: Vec<usize>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn push(&mut self, image: Tensor, label: usize) {
        self.images.push(image);
        self.labels.push(label);
    }

    pub fn get(&self, index: usize) -> (&Tensor, usize) {
        (&self.images[index], self.labels[index])
    }

    /// Copy the samples at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        let mut out = Dataset::new();
        for &i in indices {
            out.push(self.images[i].clone(), self.labels[i]);
        }
        out
    }

    /// Load a CSV file
    ///
    /// # Arguments
    ///
    /// * `path` - CSV file with a header line
    /// * `max_samples` - Stop after this many accepted rows
    /// * `num_classes_to_load` - Skip rows with `label >= num_classes_to_load`
    pub fn load_csv<P: AsRef<Path>>(
        path: P,
        max_samples: Option<usize>,
        num_classes_to_load: usize,
    ) -> Result<Dataset> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let dataset = Self::read_csv(BufReader::new(file), max_samples, num_classes_to_load)?;
        println!("Loaded {} samples from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    /// Parse CSV rows from any reader (see [`Dataset::load_csv`])
    pub fn read_csv<R: BufRead>(
        reader: R,
        max_samples: Option<usize>,
        num_classes_to_load: usize,
    ) -> Result<Dataset> {
        let mut dataset = Dataset::new();

        // Header
        for line in reader.split(b'\n').skip(1) {
            if max_samples.is_some_and(|max| dataset.len() >= max) {
                break;
            }
            let bytes = line?;
            let line = String::from_utf8_lossy(&bytes);
            let mut cells = line.split(',');

            let Some(label) = cells.next().and_then(parse_label) else {
                continue;
            };
            if label >= num_classes_to_load {
                continue;
            }

            let mut image = Tensor::zeros(IMAGE_SIDE, IMAGE_SIDE);
            for (i, cell) in cells.take(IMAGE_PIXELS).enumerate() {
                let Ok(value) = cell.trim().parse::<f32>() else {
                    break;
                };
                image.data[i] = value / 255.0;
            }
            dataset.push(image, label);
        }

        Ok(dataset)
    }

    /// Shuffle and partition into train, validation and test sets
    ///
    /// Validation and test sizes are `floor(len × fraction)`; training gets
    /// the rest.
    pub fn split<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        val_fraction: f32,
        test_fraction: f32,
    ) -> (Dataset, Dataset, Dataset) {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);

        let val_size = (self.len() as f32 * val_fraction) as usize;
        let test_size = (self.len() as f32 * test_fraction) as usize;
        let train_size = self.len().saturating_sub(val_size + test_size);
        let val_end = (train_size + val_size).min(self.len());

        (
            self.subset(&indices[..train_size]),
            self.subset(&indices[train_size..val_end]),
            self.subset(&indices[val_end..]),
        )
    }
}

/// Leading decimal digits of a label cell, so `5.0` and `5` both read as 5
fn parse_label(cell: &str) -> Option<usize> {
    let cell = cell.trim();
    let cell = cell.strip_prefix('+').unwrap_or(cell);
    let end = cell
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(cell.len());
    cell[..end].parse().ok()
}

/// Shuffle and hold out `floor(len × val_fraction)` samples for validation
///
/// # Returns
///
/// Tuple of (train, validation)
pub fn train_val_split<R: Rng + ?Sized>(
    dataset: &Dataset,
    rng: &mut R,
    val_fraction: f32,
) -> (Dataset, Dataset) {
    let mut indices: Vec<usize> = (0..dataset.len()).collect();
    indices.shuffle(rng);

    let val_size = ((dataset.len() as f32 * val_fraction) as usize).min(dataset.len());
    let (val, train) = indices.split_at(val_size);
    (dataset.subset(train), dataset.subset(val))
}

/// Average loss and accuracy over a pass through a dataset
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EpochStats {
    pub loss: f32,
    pub accuracy: f32,
    pub samples: usize,
}

impl EpochStats {
    fn from_totals(total_loss: f32, correct: usize, samples: usize) -> Self {
        if samples == 0 {
            return Self::default();
        }
        Self {
            loss: total_loss / samples as f32,
            accuracy: correct as f32 / samples as f32,
            samples,
        }
    }
}

/// Train for one epoch
///
/// Shuffles the sample order, then for each batch: `zero_grad`, forward and
/// backward per sample, `update_weights(learning_rate)`. The reported loss and
/// accuracy come from the logits computed during training.
pub fn train_epoch<R: Rng + ?Sized>(
    model: &mut VisionTransformer,
    data: &Dataset,
    batch_size: usize,
    learning_rate: f32,
    rng: &mut R,
    show_progress: bool,
) -> EpochStats {
    assert!(batch_size > 0, "batch_size must be positive");

    let mut order: Vec<usize> = (0..data.len()).collect();
    order.shuffle(rng);

    let total_batches = data.len().div_ceil(batch_size);
    let mut total_loss = 0.0;
    let mut correct = 0;

    for (batch_idx, batch) in order.chunks(batch_size).enumerate() {
        model.zero_grad();
        for &idx in batch {
            let (image, label) = data.get(idx);
            let logits = model.forward(image);
            model.backward(label);
            total_loss += model.compute_loss(&logits, label);
            if logits.argmax_row(0) == label {
                correct += 1;
            }
        }
        model.update_weights(learning_rate);

        if show_progress {
            print!("{}\r", progress_bar(batch_idx + 1, total_batches, PROGRESS_WIDTH));
            let _ = io::stdout().flush();
        }
    }
    if show_progress && total_batches > 0 {
        println!();
    }

    EpochStats::from_totals(total_loss, correct, data.len())
}

/// Loss and accuracy without touching gradients or parameters
pub fn evaluate(model: &mut VisionTransformer, data: &Dataset) -> EpochStats {
    let mut total_loss = 0.0;
    let mut correct = 0;
    for (image, &label) in data.images.iter().zip(&data.labels) {
        let logits = model.forward(image);
        total_loss += model.compute_loss(&logits, label);
        if logits.argmax_row(0) == label {
            correct += 1;
        }
    }
    EpochStats::from_totals(total_loss, correct, data.len())
}

/// Synthetic test image: a white square on a black canvas
///
/// The square covers rows and columns `2/7 · size .. 5/7 · size`, which is
/// `8..20` for a 28x28 image.
pub fn probe_image(size: usize) -> Tensor {
    let (start, end) = (size * 2 / 7, size * 5 / 7);
    let mut image = Tensor::zeros(size, size);
    for r in start..end {
        for c in start..end {
            image.set(r, c, 1.0);
        }
    }
    image
}

/// Render a text progress bar, e.g. `[=====>    ] 50 %`
pub fn progress_bar(current: usize, total: usize, width: usize) -> String {
    let progress = if total == 0 {
        1.0
    } else {
        current as f32 / total as f32
    };
    let pos = (width as f32 * progress) as usize;

    let bar: String = (0..width)
        .map(|i| match i.cmp(&pos) {
            std::cmp::Ordering::Less => '=',
            std::cmp::Ordering::Equal => '>',
            std::cmp::Ordering::Greater => ' ',
        })
        .collect();
    format!("[{}] {} %", bar, (progress * 100.0) as usize)
}
