//! Dataset and configuration file tests

use std::io::Write;
use tempfile::NamedTempFile;
use tinyvit::train::IMAGE_PIXELS;
use tinyvit::{load_config, rng, Dataset, GradientMode, VitError};

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp file");
    file
}

fn full_row(label: usize, pixel: u8) -> String {
    let pixels = vec![pixel.to_string(); IMAGE_PIXELS].join(",");
    format!("{label},{pixels}")
}

// ============================================================================
// CSV Loading
// ============================================================================

mod csv_tests {
    use super::*;

    #[test]
    fn test_full_rows() {
        let csv = format!("label,pixels\n{}\n{}\n", full_row(4, 255), full_row(9, 51));
        let file = write_temp(&csv);
        let data = Dataset::load_csv(file.path(), None, 10).unwrap();

        assert_eq!(data.labels, vec![4, 9]);
        assert!(data.images[0].data.iter().all(|&p| p == 1.0));
        assert!(data.images[1].data.iter().all(|&p| (p - 0.2).abs() < 1e-7));
    }

    #[test]
    fn test_truncated_row_zero_padded() {
        let file = write_temp("label,p0,p1\n3,255,255,255\n");
        let data = Dataset::load_csv(file.path(), None, 10).unwrap();
        let image = &data.images[0];
        assert_eq!(image.data[..3], [1.0, 1.0, 1.0]);
        assert!(image.data[3..].iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_num_classes_filter_and_limit() {
        let rows: Vec<String> = (0..10).map(|l| full_row(l, 0)).collect();
        let file = write_temp(&format!("header\n{}\n", rows.join("\n")));

        let data = Dataset::load_csv(file.path(), None, 3).unwrap();
        assert_eq!(data.labels, vec![0, 1, 2]);

        let data = Dataset::load_csv(file.path(), Some(2), 10).unwrap();
        assert_eq!(data.labels, vec![0, 1]);
    }

    #[test]
    fn test_unparsable_label_skipped() {
        let file = write_temp("header\nseven,1,2\n-1,1,2\n5,1,2\n");
        let data = Dataset::load_csv(file.path(), None, 10).unwrap();
        assert_eq!(data.labels, vec![5]);
    }

    #[test]
    fn test_invalid_utf8_row_does_not_drop_neighbours() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"label,p0\n1,255\n2,\xff\xfe\n3,255\n").unwrap();
        let data = Dataset::load_csv(file.path(), None, 10).unwrap();

        assert_eq!(data.labels, vec![1, 2, 3]);
        assert_eq!(data.images[0].data[0], 1.0);
        assert!(data.images[1].data.iter().all(|&p| p == 0.0));
        assert_eq!(data.images[2].data[0], 1.0);
    }

    #[test]
    fn test_decimal_label_reads_integer_part() {
        let file = write_temp("h\n5.0,255\n");
        let data = Dataset::load_csv(file.path(), None, 10).unwrap();
        assert_eq!(data.labels, vec![5]);
        assert_eq!(data.images[0].data[0], 1.0);
    }

    #[test]
    fn test_windows_line_endings() {
        let file = write_temp("header\r\n2,255\r\n");
        let data = Dataset::load_csv(file.path(), None, 10).unwrap();
        assert_eq!(data.labels, vec![2]);
        assert_eq!(data.images[0].data[0], 1.0);
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let file = write_temp("label,pixel0\n");
        let data = Dataset::load_csv(file.path(), None, 10).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let result = Dataset::load_csv("definitely/not/here.csv", None, 10);
        assert!(matches!(result, Err(VitError::Io(_))));
    }

    #[test]
    fn test_split_is_reproducible() {
        let rows: Vec<String> = (0..40).map(|l| full_row(l % 10, 0)).collect();
        let file = write_temp(&format!("header\n{}\n", rows.join("\n")));
        let data = Dataset::load_csv(file.path(), None, 10).unwrap();

        let (a_train, a_val, a_test) = data.split(&mut rng::seeded(5), 0.1, 0.1);
        let (b_train, _, _) = data.split(&mut rng::seeded(5), 0.1, 0.1);
        assert_eq!((a_train.len(), a_val.len(), a_test.len()), (32, 4, 4));
        assert_eq!(a_train.labels, b_train.labels);
    }
}

// ============================================================================
// Configuration Files
// ============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_load_partial_config() {
        let file = write_temp(
            r#"{
                "model": { "d_model": 32, "num_layers": 1, "gradient_mode": "exact" },
                "training": { "epochs": 3, "learning_rate": 0.001 }
            }"#,
        );
        let cfg = load_config(file.path()).expect("Failed to load config");
        assert_eq!(cfg.model.d_model, 32);
        assert_eq!(cfg.model.num_layers, 1);
        assert_eq!(cfg.model.patch_size, 4);
        assert_eq!(cfg.model.gradient_mode, GradientMode::Exact);
        assert_eq!(cfg.training.epochs, 3);
        assert_eq!(cfg.training.batch_size, 128);
    }

    #[test]
    fn test_empty_object_gives_defaults() {
        let file = write_temp("{}");
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.model.image_size, 28);
        assert_eq!(cfg.training.seed, 42);
    }

    #[test]
    fn test_invalid_json() {
        let file = write_temp("{ not json");
        assert!(matches!(
            load_config(file.path()),
            Err(VitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_temp(r#"{ "model": { "patch_size": 5 } }"#);
        assert!(load_config(file.path()).is_err());

        let file = write_temp(r#"{ "training": { "val_split": 1.5 } }"#);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(matches!(
            load_config("no/such/config.json"),
            Err(VitError::Io(_))
        ));
    }
}
