//! Model Files
//!
//! Models are stored as plain, line-oriented text so they can be inspected
//! and diffed by hand.
//!
//! ## Format
//!
//! ```text
//! MODEL_CONFIG
//! image_size 28
//! patch_size 4
//! d_model 64
//! num_layers 2
//! num_classes 10
//! num_patches 49
//! class_token 1 64
//! 0.0031 -0.0107 ...
//! position_embeddings 50 64
//! ...                              (one line per tensor row)
//! ```
//!
//! Tensor blocks follow the order of
//! [`VisionTransformer::named_parameters`]. Floats are written in their
//! shortest round-trip form, so a reloaded model reproduces the saved one
//! exactly.
//!
//! ## Loading
//!
//! The header rebuilds the model skeleton, then every block is checked
//! against the expected name and shape before its values are copied in.
//! Any mismatch aborts the load with an error; a partially loaded model is
//! never returned. The gradient mode is not stored: loaded models start in
//! [`GradientMode::Reference`](crate::config::GradientMode::Reference).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::VitConfig;
use crate::error::{Result, VitError};
use crate::rng::seeded;
use crate::tensor::Tensor;
use crate::vit::VisionTransformer;

const HEADER: &str = "MODEL_CONFIG";

/// Seed for the throwaway initialization a load overwrites
const LOAD_SEED: u64 = 1;

/// Write `model` to `path` in the text model format
pub fn save_model<P: AsRef<Path>>(model: &VisionTransformer, path: P) -> Result<()> {
    let path = path.as_ref();
    println!("💾 Saving model to {}...", path.display());

    let mut writer = BufWriter::new(File::create(path)?);
    write_model(model, &mut writer)?;
    writer.flush()?;

    println!(
        "   {} tensors, {} parameters",
        model.named_parameters().len(),
        model.parameter_count()
    );
    Ok(())
}

/// Serialize `model` into any writer
pub fn write_model<W: Write>(model: &VisionTransformer, out: &mut W) -> Result<()> {
    let config = model.config();
    writeln!(out, "{HEADER}")?;
    writeln!(out, "image_size {}", config.image_size)?;
    writeln!(out, "patch_size {}", config.patch_size)?;
    writeln!(out, "d_model {}", config.d_model)?;
    writeln!(out, "num_layers {}", config.num_layers)?;
    writeln!(out, "num_classes {}", config.num_classes)?;
    writeln!(out, "num_patches {}", config.num_patches())?;

    for (name, tensor) in model.named_parameters() {
        write_tensor(out, &name, tensor)?;
    }
    Ok(())
}

fn write_tensor<W: Write>(out: &mut W, name: &str, tensor: &Tensor) -> Result<()> {
    writeln!(out, "{} {} {}", name, tensor.rows, tensor.cols)?;
    for i in 0..tensor.rows {
        let line = tensor
            .row(i)
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Read a model from `path`
///
/// # Errors
///
/// - [`VitError::Io`] if the file cannot be read
/// - [`VitError::Format`] for a missing header, unknown header key or bad number
/// - [`VitError::InvalidConfig`] if the header describes an unbuildable or
///   oversized model
/// - [`VitError::TensorNameMismatch`] / [`VitError::TensorShapeMismatch`] when a
///   tensor block does not match the model the header describes
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<VisionTransformer> {
    let path = path.as_ref();
    println!("📂 Loading model from {}...", path.display());

    let contents = fs::read_to_string(path)?;
    let model = parse_model(&contents)?;

    println!(
        "   {} layers, d_model {}, {} parameters",
        model.config().num_layers,
        model.config().d_model,
        model.parameter_count()
    );
    Ok(model)
}

/// Parse a model from the text of a model file
pub fn parse_model(contents: &str) -> Result<VisionTransformer> {
    let mut tokens = Tokens::new(contents);

    let header = tokens.next_str("header")?;
    if header != HEADER {
        return Err(VitError::format(format!(
            "expected '{HEADER}', found '{header}'"
        )));
    }

    let config = VitConfig {
        image_size: tokens.expect_key("image_size")?,
        patch_size: tokens.expect_key("patch_size")?,
        d_model: tokens.expect_key("d_model")?,
        num_layers: tokens.expect_key("num_layers")?,
        num_classes: tokens.expect_key("num_classes")?,
        ..VitConfig::default()
    };
    let num_patches: usize = tokens.expect_key("num_patches")?;
    config.validate()?;
    if num_patches != config.num_patches() {
        return Err(VitError::format(format!(
            "num_patches {} disagrees with image_size {} / patch_size {}",
            num_patches, config.image_size, config.patch_size
        )));
    }

    let mut model = VisionTransformer::new(config, &mut seeded(LOAD_SEED))?;
    for (expected, tensor) in model.named_parameters_mut() {
        let found = tokens.next_str("tensor name")?;
        if found != expected {
            return Err(VitError::TensorNameMismatch {
                expected,
                found: found.to_string(),
            });
        }

        let rows: usize = tokens.next_parsed(&expected)?;
        let cols: usize = tokens.next_parsed(&expected)?;
        if (rows, cols) != tensor.shape() {
            return Err(VitError::TensorShapeMismatch {
                name: expected,
                expected: tensor.shape(),
                found: (rows, cols),
            });
        }

        for value in tensor.data.iter_mut() {
            *value = tokens.next_parsed(&expected)?;
        }
    }

    Ok(model)
}

/// Whitespace tokenizer over the model file
struct Tokens<'a> {
    inner: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(contents: &'a str) -> Self {
        Self {
            inner: contents.split_whitespace(),
        }
    }

    fn next_str(&mut self, what: &str) -> Result<&'a str> {
        self.inner
            .next()
            .ok_or_else(|| VitError::format(format!("unexpected end of file reading {what}")))
    }

    fn next_parsed<T: std::str::FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next_str(what)?;
        token
            .parse()
            .map_err(|_| VitError::format(format!("invalid number '{token}' in {what}")))
    }

    fn expect_key<T: std::str::FromStr>(&mut self, key: &str) -> Result<T> {
        let found = self.next_str(key)?;
        if found != key {
            return Err(VitError::format(format!(
                "expected header key '{key}', found '{found}'"
            )));
        }
        self.next_parsed(key)
    }
}
