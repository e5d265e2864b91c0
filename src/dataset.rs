use std::{fs::File, io::Read, path::Path};

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use parquet::{
    file::{reader::FileReader, serialized_reader::SerializedFileReader},
    record::Field,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::DatasetError;

/// Feature rows with one integer label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    /// One row of feature values per example.
    features: Array2<f64>,
    /// The label of each row.
    labels: Array1<usize>,
}

impl LabeledDataset {
    pub fn new(features: Array2<f64>, labels: Array1<usize>) -> Result<Self, DatasetError> {
        if features.nrows() != labels.len() {
            return Err(DatasetError::Shape(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Builds a dataset from rows laid out as `features..., label`.
    fn from_rows(rows: Vec<(Vec<f64>, usize)>) -> Result<Self, DatasetError> {
        let n_features = rows.first().map_or(0, |(features, _)| features.len());
        let mut flat = Vec::with_capacity(rows.len() * n_features);
        let mut labels = Vec::with_capacity(rows.len());

        for (row, (features, label)) in rows.into_iter().enumerate() {
            if features.len() != n_features {
                return Err(DatasetError::Schema {
                    row,
                    message: format!(
                        "expected {} feature columns, found {}",
                        n_features,
                        features.len()
                    ),
                });
            }
            flat.extend(features);
            labels.push(label);
        }

        let features = Array2::from_shape_vec((labels.len(), n_features), flat)
            .map_err(|e| DatasetError::Shape(e.to_string()))?;
        Self::new(features, Array1::from(labels))
    }

    /// Parses CSV rows of feature columns followed by a trailing label column.
    pub fn from_csv_reader<R: Read>(reader: R, has_headers: bool) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let fields: Vec<&str> = record.iter().collect();
            let Some((&label, features)) = fields.split_last() else {
                continue;
            };
            if features.is_empty() {
                return Err(DatasetError::Schema {
                    row,
                    message: "expected at least one feature column and a label".into(),
                });
            }

            let features = features
                .iter()
                .map(|value| {
                    value.parse::<f64>().map_err(|_| DatasetError::Schema {
                        row,
                        message: format!("invalid feature value {value:?}"),
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            let label = parse_label(label).ok_or_else(|| DatasetError::Schema {
                row,
                message: format!("invalid label {label:?}"),
            })?;
            rows.push((features, label));
        }

        Self::from_rows(rows)
    }

    /// Loads a CSV file with a header row.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let dataset = Self::from_csv_reader(File::open(path.as_ref())?, true)?;
        debug!(
            "Loaded {} rows with {} features from {}",
            dataset.len(),
            dataset.n_features(),
            path.as_ref().display()
        );
        Ok(dataset)
    }

    /// Loads a parquet file whose last column holds the label.
    pub fn load_parquet(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let dataset_file = File::open(path.as_ref())?;
        let reader: SerializedFileReader<File> = SerializedFileReader::new(dataset_file)?;

        let mut rows = Vec::new();
        for (row_index, row) in reader.get_row_iter(None)?.enumerate() {
            let row = row?;
            let fields: Vec<&Field> = row.get_column_iter().map(|(_, field)| field).collect();
            let Some((label, features)) = fields.split_last() else {
                continue;
            };
            if features.is_empty() {
                return Err(DatasetError::Schema {
                    row: row_index,
                    message: "expected at least one feature column and a label".into(),
                });
            }

            let features = features
                .iter()
                .map(|field| {
                    field_to_f64(field).ok_or_else(|| DatasetError::Schema {
                        row: row_index,
                        message: format!("non-numeric feature {field}"),
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            let label = field_to_label(label).ok_or_else(|| DatasetError::Schema {
                row: row_index,
                message: format!("invalid label {label}"),
            })?;
            rows.push((features, label));
        }

        let dataset = Self::from_rows(rows)?;
        debug!(
            "Loaded {} rows with {} features from {}",
            dataset.len(),
            dataset.n_features(),
            path.as_ref().display()
        );
        Ok(dataset)
    }

    /// Loads a dataset, choosing the reader from the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("parquet") => Self::load_parquet(path),
            _ => Self::load_csv(path),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> ArrayView1<'_, usize> {
        self.labels.view()
    }

    /// Largest label plus one.
    pub fn num_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&max| max + 1)
    }

    /// Number of rows per label. Labels at or above `num_classes` are not counted.
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for &label in &self.labels {
            if let Some(count) = counts.get_mut(label) {
                *count += 1;
            }
        }
        counts
    }

    /// The row at `index` reshaped into a square pixel grid.
    pub fn image(&self, index: usize) -> Option<Array2<f64>> {
        let side = square_side(self.n_features())?;
        if index >= self.len() {
            return None;
        }
        self.features
            .row(index)
            .to_owned()
            .into_shape((side, side))
            .ok()
    }

    /// Divides every feature by `divisor`, e.g. the maximum pixel intensity.
    pub fn scaled(mut self, divisor: f64) -> Result<Self, DatasetError> {
        if !(divisor.is_finite() && divisor > 0.0) {
            return Err(DatasetError::InvalidScale(divisor));
        }
        self.features.mapv_inplace(|v| v / divisor);
        Ok(self)
    }

    /// Shuffles the rows with a seeded RNG and splits off `ceil(len * test_fraction)`
    /// of them as the test set. Returns `(train, test)`.
    pub fn train_test_split(
        &self,
        test_fraction: f64,
        seed: u64,
    ) -> Result<(Self, Self), DatasetError> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(DatasetError::Split(format!(
                "test fraction must be in (0, 1), got {test_fraction}"
            )));
        }

        let n_test = (self.len() as f64 * test_fraction).ceil() as usize;
        if n_test == 0 || n_test >= self.len() {
            return Err(DatasetError::Split(format!(
                "{} rows cannot be split with test fraction {}",
                self.len(),
                test_fraction
            )));
        }

        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let (test_idx, train_idx) = indices.split_at(n_test);

        debug!(
            "Split {} rows into {} train / {} test (seed {})",
            self.len(),
            train_idx.len(),
            test_idx.len(),
            seed
        );

        Ok((self.select(train_idx), self.select(test_idx)))
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        }
    }

    /// Warns about classes in `[0, num_classes)` that have no rows.
    pub fn warn_missing_classes(&self, num_classes: usize) {
        for (class, count) in self.class_counts(num_classes).into_iter().enumerate() {
            if count == 0 {
                warn!("Class {class} has no examples");
            }
        }
    }
}

fn parse_label(value: &str) -> Option<usize> {
    value.parse::<usize>().ok()
}

fn square_side(n: usize) -> Option<usize> {
    let side = (n as f64).sqrt().round() as usize;
    (side > 0 && side * side == n).then_some(side)
}

fn field_to_f64(field: &Field) -> Option<f64> {
    Some(match *field {
        Field::Byte(v) => v as f64,
        Field::Short(v) => v as f64,
        Field::Int(v) => v as f64,
        Field::Long(v) => v as f64,
        Field::UByte(v) => v as f64,
        Field::UShort(v) => v as f64,
        Field::UInt(v) => v as f64,
        Field::ULong(v) => v as f64,
        Field::Float(v) => v as f64,
        Field::Double(v) => v,
        _ => return None,
    })
}

fn field_to_label(field: &Field) -> Option<usize> {
    match *field {
        Field::Byte(v) => usize::try_from(v).ok(),
        Field::Short(v) => usize::try_from(v).ok(),
        Field::Int(v) => usize::try_from(v).ok(),
        Field::Long(v) => usize::try_from(v).ok(),
        Field::UByte(v) => Some(v as usize),
        Field::UShort(v) => Some(v as usize),
        Field::UInt(v) => usize::try_from(v).ok(),
        Field::ULong(v) => usize::try_from(v).ok(),
        _ => None,
    }
}
