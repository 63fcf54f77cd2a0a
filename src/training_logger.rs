//! Training Logger
//!
//! Records per-epoch metrics to a CSV file and echoes them to the console.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tinyvit::{EpochStats, TrainingLogger};
//!
//! let mut logger = TrainingLogger::new("training_log.csv")
//!     .expect("Failed to create logger");
//!
//! let train = EpochStats { loss: 0.9, accuracy: 0.71, samples: 54000 };
//! let val = EpochStats { loss: 0.8, accuracy: 0.74, samples: 6000 };
//! logger.log(1, 3e-4, &train, &val).expect("Failed to log");
//! ```
//!
//! ## CSV Format
//!
//! - `epoch`: Epoch number, starting at 1
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Learning rate used for the epoch
//! - `train_loss`, `train_accuracy`: Averages over the training pass
//! - `val_loss`, `val_accuracy`: Averages over the validation set
//!
//! Accuracies are fractions in `[0, 1]`; the console shows percentages.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::train::EpochStats;

pub const CSV_HEADER: &str =
    "epoch,elapsed_seconds,learning_rate,train_loss,train_accuracy,val_loss,val_accuracy";

/// CSV + console logger for epoch metrics
pub struct TrainingLogger {
    log_file: File,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    pub fn new<P: AsRef<Path>>(log_path: P) -> std::io::Result<Self> {
        let mut log_file = File::create(log_path)?;
        writeln!(log_file, "{CSV_HEADER}")?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Append one epoch's metrics and print them
    ///
    /// The file is flushed after every row so a crashed run keeps its history.
    pub fn log(
        &mut self,
        epoch: usize,
        learning_rate: f32,
        train: &EpochStats,
        val: &EpochStats,
    ) -> std::io::Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();

        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.4},{:.4},{:.4},{:.4}",
            epoch, elapsed, learning_rate, train.loss, train.accuracy, val.loss, val.accuracy
        )?;
        self.log_file.flush()?;

        let epoch_time = self.last_log_time.elapsed().as_secs_f32();
        println!(
            "  Train - Loss: {:.4} | Accuracy: {:.2}%",
            train.loss,
            train.accuracy * 100.0
        );
        println!(
            "  Val   - Loss: {:.4} | Accuracy: {:.2}%",
            val.loss,
            val.accuracy * 100.0
        );
        println!(
            "  Epoch {:3} | Time: {:7.1}s (+{:.1}s) | LR: {:.6}",
            epoch, elapsed, epoch_time, learning_rate
        );

        self.last_log_time = Instant::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut logger = TrainingLogger::new(&path).unwrap();
        let stats = EpochStats {
            loss: 1.5,
            accuracy: 0.25,
            samples: 8,
        };
        logger.log(1, 0.001, &stats, &stats).unwrap();
        logger.log(2, 0.001, &stats, &stats).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("1,"));
        assert!(lines[2].ends_with(",0.001000,1.5000,0.2500,1.5000,0.2500"));
    }
}
