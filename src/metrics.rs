use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

/// An integer class identifier.
pub trait Label: Copy + Send + Sync {
    /// The label as a row/column index, `None` when negative or too large for `usize`.
    fn to_index(self) -> Option<usize>;

    /// The raw label value, used for error reporting.
    fn value(self) -> i128;
}

macro_rules! impl_label {
    ($($t:ty),*) => {
        $(
            impl Label for $t {
                #[inline]
                fn to_index(self) -> Option<usize> {
                    usize::try_from(self).ok()
                }

                #[inline]
                fn value(self) -> i128 {
                    self as i128
                }
            }
        )*
    };
}

impl_label!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// Counts of predicted vs actual labels. Cell `(p, a)` holds the number of
/// examples predicted as `p` whose actual label is `a`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<usize>>")]
pub struct ConfusionMatrix(Box<[Box<[usize]>]>);

impl TryFrom<Vec<Vec<usize>>> for ConfusionMatrix {
    type Error = MetricsError;

    /// Accepts only non-empty square grids.
    fn try_from(rows: Vec<Vec<usize>>) -> Result<Self, Self::Error> {
        if rows.is_empty() {
            return Err(MetricsError::NoClasses);
        }
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != rows.len())
        {
            return Err(MetricsError::NotSquare {
                size: rows.len(),
                row,
                len: cells.len(),
            });
        }
        Ok(Self(
            rows.into_iter()
                .map(Vec::into_boxed_slice)
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        ))
    }
}

/// Correct and wrong predictions for one actual class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassOutcome {
    pub class: usize,
    pub correct: usize,
    pub wrong: usize,
}

impl ConfusionMatrix {
    fn zeros(num_classes: usize) -> Self {
        Self(vec![vec![0usize; num_classes].into_boxed_slice(); num_classes].into_boxed_slice())
    }

    /// Counts the pair found at `index`, rejecting labels outside the matrix.
    fn record<L: Label>(
        &mut self,
        index: usize,
        predicted: L,
        actual: L,
    ) -> Result<(), MetricsError> {
        let p = self.checked_index(index, predicted)?;
        let a = self.checked_index(index, actual)?;
        self.0[p][a] += 1;
        Ok(())
    }

    fn checked_index<L: Label>(&self, index: usize, label: L) -> Result<usize, MetricsError> {
        match label.to_index() {
            Some(i) if i < self.0.len() => Ok(i),
            _ => Err(MetricsError::OutOfRangeLabel {
                index,
                value: label.value(),
                num_classes: self.0.len(),
            }),
        }
    }

    /// Element-wise sum of two matrices of the same size.
    fn merge(mut self, other: Self) -> Self {
        for (row, other_row) in self.0.iter_mut().zip(other.0.iter()) {
            for (cell, &count) in row.iter_mut().zip(other_row.iter()) {
                *cell += count;
            }
        }
        self
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.0.len()
    }

    /// The count at `(predicted, actual)`, `None` outside the matrix.
    pub fn get(&self, predicted: usize, actual: usize) -> Option<usize> {
        self.0.get(predicted)?.get(actual).copied()
    }

    /// Rows indexed by predicted label.
    pub fn rows(&self) -> &[Box<[usize]>] {
        &self.0
    }

    /// Total number of counted examples.
    pub fn total(&self) -> usize {
        self.0.iter().flatten().sum()
    }

    /// Number of correctly predicted examples.
    pub fn trace(&self) -> usize {
        self.0.iter().enumerate().map(|(i, row)| row[i]).sum()
    }

    pub fn accuracy(&self) -> Result<f64, MetricsError> {
        let total_samples = self.total();
        if total_samples == 0 {
            return Err(MetricsError::UndefinedAccuracy);
        }
        Ok(self.trace() as f64 / total_samples as f64)
    }

    /// Number of examples whose actual label is `class`, `None` outside the matrix.
    pub fn support(&self, class: usize) -> Option<usize> {
        (class < self.num_classes()).then(|| self.0.iter().map(|row| row[class]).sum())
    }

    /// Number of examples predicted as `class`, `None` outside the matrix.
    pub fn predicted_count(&self, class: usize) -> Option<usize> {
        self.0.get(class).map(|row| row.iter().sum())
    }

    /// `None` for a class outside the matrix or without actual examples.
    pub fn recall(&self, class: usize) -> Option<f64> {
        let total_actual_positive = self.support(class)?;
        (total_actual_positive > 0)
            .then(|| self.0[class][class] as f64 / total_actual_positive as f64)
    }

    /// `None` for a class outside the matrix or never predicted.
    pub fn precision(&self, class: usize) -> Option<f64> {
        let total_predicted_positive = self.predicted_count(class)?;
        (total_predicted_positive > 0)
            .then(|| self.0[class][class] as f64 / total_predicted_positive as f64)
    }

    /// Correct and wrong counts for every actual class.
    pub fn class_outcomes(&self) -> Vec<ClassOutcome> {
        (0..self.num_classes())
            .map(|class| {
                let correct = self.0[class][class];
                let support: usize = self.0.iter().map(|row| row[class]).sum();
                ClassOutcome {
                    class,
                    correct,
                    wrong: support - correct,
                }
            })
            .collect()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .0
            .iter()
            .flatten()
            .max()
            .map_or(1, |max| max.to_string().len())
            .max(self.num_classes().saturating_sub(1).to_string().len());

        write!(f, "{:>9} |", "pred\\act")?;
        for a in 0..self.num_classes() {
            write!(f, " {a:>width$}")?;
        }
        writeln!(f)?;
        for (p, row) in self.0.iter().enumerate() {
            write!(f, "{p:>9} |")?;
            for count in row.iter() {
                write!(f, " {count:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn check_inputs<L>(predicted: &[L], actual: &[L], num_classes: usize) -> Result<(), MetricsError> {
    if num_classes == 0 {
        return Err(MetricsError::NoClasses);
    }
    if predicted.len() != actual.len() {
        return Err(MetricsError::LengthMismatch {
            predicted: predicted.len(),
            actual: actual.len(),
        });
    }
    Ok(())
}

/// Compute the confusion matrix from a list of predicted and actual labels.
///
/// Every label must lie in `[0, num_classes)`; the first one that does not is
/// reported with its index. Lengths are compared before any label is read.
pub fn confusion_matrix<L: Label>(
    predicted: &[L],
    actual: &[L],
    num_classes: usize,
) -> Result<ConfusionMatrix, MetricsError> {
    check_inputs(predicted, actual, num_classes)?;

    let mut matrix = ConfusionMatrix::zeros(num_classes);
    for (i, (&p, &a)) in predicted.iter().zip(actual.iter()).enumerate() {
        matrix.record(i, p, a)?;
    }

    Ok(matrix)
}

/// Same as [`confusion_matrix`], accumulating partial matrices on the rayon
/// pool and merging them. With several bad labels any one of them may be reported.
pub fn confusion_matrix_par<L: Label>(
    predicted: &[L],
    actual: &[L],
    num_classes: usize,
) -> Result<ConfusionMatrix, MetricsError> {
    check_inputs(predicted, actual, num_classes)?;

    predicted
        .par_iter()
        .zip(actual.par_iter())
        .enumerate()
        .try_fold(
            || ConfusionMatrix::zeros(num_classes),
            |mut matrix, (i, (&p, &a))| -> Result<_, MetricsError> {
                matrix.record(i, p, a)?;
                Ok(matrix)
            },
        )
        .try_reduce(
            || ConfusionMatrix::zeros(num_classes),
            |left, right| Ok(left.merge(right)),
        )
}

/// Fraction of positions where the predicted label equals the actual one.
pub fn accuracy<L: PartialEq>(predicted: &[L], actual: &[L]) -> Result<f64, MetricsError> {
    if predicted.len() != actual.len() {
        return Err(MetricsError::LengthMismatch {
            predicted: predicted.len(),
            actual: actual.len(),
        });
    }
    if actual.is_empty() {
        return Err(MetricsError::UndefinedAccuracy);
    }

    let correct = predicted
        .iter()
        .zip(actual.iter())
        .filter(|(p, a)| p == a)
        .count();

    Ok(correct as f64 / actual.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_class_scenario() {
        let predicted = [0usize, 1, 2, 1];
        let actual = [0usize, 1, 1, 1];
        let matrix = confusion_matrix(&predicted, &actual, 3).unwrap();

        for p in 0..3 {
            for a in 0..3 {
                let expected = match (p, a) {
                    (1, 1) => 2,
                    (2, 1) => 1,
                    (0, 0) => 1,
                    _ => 0,
                };
                assert_eq!(matrix.get(p, a), Some(expected), "cell ({p}, {a})");
            }
        }
        assert_eq!(accuracy(&predicted, &actual).unwrap(), 0.75);
        assert_eq!(matrix.accuracy().unwrap(), 0.75);
    }

    #[test]
    fn all_wrong() {
        let predicted = [1u8, 1, 1];
        let actual = [0u8, 0, 0];
        let matrix = confusion_matrix(&predicted, &actual, 2).unwrap();
        assert_eq!(matrix.get(1, 0), Some(3));
        assert_eq!(matrix.total(), 3);
        assert_eq!(accuracy(&predicted, &actual).unwrap(), 0.0);
    }

    #[test]
    fn perfect_predictions_give_identity() {
        let labels: Vec<usize> = (0..10).collect();
        let matrix = confusion_matrix(&labels, &labels, 10).unwrap();
        for p in 0..10 {
            for a in 0..10 {
                assert_eq!(matrix.get(p, a), Some(usize::from(p == a)));
            }
        }
        assert_eq!(accuracy(&labels, &labels).unwrap(), 1.0);
    }

    #[test]
    fn label_equal_to_num_classes_is_rejected() {
        let err = confusion_matrix(&[0usize, 3], &[0usize, 1], 3).unwrap_err();
        assert_eq!(
            err,
            MetricsError::OutOfRangeLabel {
                index: 1,
                value: 3,
                num_classes: 3
            }
        );
    }

    #[test]
    fn negative_label_is_rejected() {
        let err = confusion_matrix(&[0i32, 1, 2], &[0i32, -1, 2], 3).unwrap_err();
        assert_eq!(
            err,
            MetricsError::OutOfRangeLabel {
                index: 1,
                value: -1,
                num_classes: 3
            }
        );
    }

    #[test]
    fn length_mismatch_is_checked_first() {
        // The out-of-range label must not be reached.
        let predicted = [9i64, 0, 0, 0, 0];
        let actual = [0i64, 0, 0, 0];
        let expected = MetricsError::LengthMismatch {
            predicted: 5,
            actual: 4,
        };
        assert_eq!(confusion_matrix(&predicted, &actual, 2).unwrap_err(), expected);
        assert_eq!(confusion_matrix_par(&predicted, &actual, 2).unwrap_err(), expected);
        assert_eq!(accuracy(&predicted, &actual).unwrap_err(), expected);
    }

    #[test]
    fn empty_input() {
        let empty: [usize; 0] = [];
        assert_eq!(accuracy(&empty, &empty), Err(MetricsError::UndefinedAccuracy));

        let matrix = confusion_matrix(&empty, &empty, 4).unwrap();
        assert_eq!(matrix.total(), 0);
        assert_eq!(matrix.accuracy(), Err(MetricsError::UndefinedAccuracy));
    }

    #[test]
    fn zero_classes() {
        assert_eq!(
            confusion_matrix::<usize>(&[], &[], 0),
            Err(MetricsError::NoClasses)
        );
    }

    #[test]
    fn parallel_reports_bad_label() {
        let predicted: Vec<usize> = (0..1000).map(|i| i % 5).collect();
        let mut actual = predicted.clone();
        actual[731] = 7;
        match confusion_matrix_par(&predicted, &actual, 5) {
            Err(MetricsError::OutOfRangeLabel { index, value, .. }) => {
                assert_eq!((index, value), (731, 7));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn per_class_scores() {
        // predicted rows, actual columns
        let predicted = [0usize, 0, 1, 1, 1, 2];
        let actual = [0usize, 1, 1, 1, 0, 0];
        let matrix = confusion_matrix(&predicted, &actual, 3).unwrap();

        assert_eq!(matrix.support(0), Some(3));
        assert_eq!(matrix.support(1), Some(3));
        assert_eq!(matrix.support(2), Some(0));
        assert_eq!(matrix.predicted_count(1), Some(3));

        assert_eq!(matrix.recall(0), Some(1.0 / 3.0));
        assert_eq!(matrix.recall(1), Some(2.0 / 3.0));
        assert_eq!(matrix.recall(2), None);
        assert_eq!(matrix.precision(0), Some(0.5));
        assert_eq!(matrix.precision(2), Some(0.0));

        let outcomes = matrix.class_outcomes();
        assert_eq!(
            outcomes[0],
            ClassOutcome {
                class: 0,
                correct: 1,
                wrong: 2
            }
        );
        assert_eq!(outcomes[2].correct + outcomes[2].wrong, 0);
    }

    #[test]
    fn display_lists_every_row() {
        let matrix = confusion_matrix(&[0usize, 1, 1], &[0usize, 1, 0], 2).unwrap();
        let table = matrix.to_string();
        assert_eq!(table.lines().count(), 3);
        assert!(table.lines().nth(2).unwrap().ends_with("1 1"));
    }

    #[test]
    fn class_outside_matrix_has_no_scores() {
        let matrix = confusion_matrix(&[0usize, 1], &[0usize, 1], 2).unwrap();
        assert_eq!(matrix.support(5), None);
        assert_eq!(matrix.predicted_count(2), None);
        assert_eq!(matrix.recall(5), None);
        assert_eq!(matrix.precision(2), None);
        assert_eq!(matrix.get(2, 0), None);
    }

    #[test]
    fn deserialize_requires_square_grid() {
        let matrix: ConfusionMatrix = serde_json::from_str("[[1,0],[2,3]]").unwrap();
        assert_eq!(matrix.get(1, 0), Some(2));
        assert_eq!(matrix.accuracy().unwrap(), 4.0 / 6.0);

        for json in ["[[1,0],[0]]", "[[1,0,0],[0,1,0]]", "[[1],[0]]", "[]"] {
            assert!(
                serde_json::from_str::<ConfusionMatrix>(json).is_err(),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn serialized_matrix_reads_back() {
        let matrix = confusion_matrix(&[0usize, 2, 1], &[0usize, 1, 1], 3).unwrap();
        let json = serde_json::to_string(&matrix).unwrap();
        assert_eq!(json, "[[1,0,0],[0,1,0],[0,1,0]]");
        assert_eq!(serde_json::from_str::<ConfusionMatrix>(&json).unwrap(), matrix);
    }
}
