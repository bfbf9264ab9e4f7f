//! Evaluation metrics for multi-label classification.

use serde::{Deserialize, Serialize};

/// Probability at or above which a class counts as predicted
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Running per-class counts, filled batch by batch during evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLabelCounts {
    pub num_classes: usize,
    pub threshold: f32,
    pub true_positives: Vec<usize>,
    pub false_positives: Vec<usize>,
    pub false_negatives: Vec<usize>,
    /// Label positions predicted correctly, positive or negative
    pub correct_labels: usize,
    /// Samples whose whole label vector was predicted correctly
    pub exact_matches: usize,
    pub num_samples: usize,
}

impl MultiLabelCounts {
    pub fn new(num_classes: usize) -> Self {
        Self::with_threshold(num_classes, DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(num_classes: usize, threshold: f32) -> Self {
        Self {
            num_classes,
            threshold,
            true_positives: vec![0; num_classes],
            false_positives: vec![0; num_classes],
            false_negatives: vec![0; num_classes],
            correct_labels: 0,
            exact_matches: 0,
            num_samples: 0,
        }
    }

    /// Adds a row-major batch of probabilities and 0/1 targets.
    ///
    /// Both slices hold `num_classes` values per sample; a trailing partial
    /// row is ignored.
    pub fn update(&mut self, probabilities: &[f32], targets: &[i64]) {
        if self.num_classes == 0 {
            return;
        }
        for (probs, truth) in probabilities
            .chunks_exact(self.num_classes)
            .zip(targets.chunks_exact(self.num_classes))
        {
            let mut all_correct = true;
            for (class, (&p, &t)) in probs.iter().zip(truth).enumerate() {
                let predicted = p >= self.threshold;
                let actual = t > 0;
                match (predicted, actual) {
                    (true, true) => self.true_positives[class] += 1,
                    (true, false) => self.false_positives[class] += 1,
                    (false, true) => self.false_negatives[class] += 1,
                    (false, false) => {}
                }
                if predicted == actual {
                    self.correct_labels += 1;
                } else {
                    all_correct = false;
                }
            }
            if all_correct {
                self.exact_matches += 1;
            }
            self.num_samples += 1;
        }
    }

    pub fn compute(&self) -> MultiLabelMetrics {
        let mut metrics = MultiLabelMetrics {
            num_samples: self.num_samples,
            ..MultiLabelMetrics::default()
        };
        if self.num_samples == 0 {
            return metrics;
        }

        metrics.subset_accuracy = self.exact_matches as f64 / self.num_samples as f64;
        metrics.hamming_accuracy =
            self.correct_labels as f64 / (self.num_samples * self.num_classes) as f64;

        let tp: usize = self.true_positives.iter().sum();
        let fp: usize = self.false_positives.iter().sum();
        let fn_: usize = self.false_negatives.iter().sum();
        metrics.micro_precision = ratio(tp, tp + fp);
        metrics.micro_recall = ratio(tp, tp + fn_);
        metrics.micro_f1 = f1(metrics.micro_precision, metrics.micro_recall);

        metrics.per_class_f1 = (0..self.num_classes)
            .map(|c| {
                let tp = self.true_positives[c];
                let precision = ratio(tp, tp + self.false_positives[c]);
                let recall = ratio(tp, tp + self.false_negatives[c]);
                f1(precision, recall)
            })
            .collect();
        metrics.macro_f1 = if self.num_classes > 0 {
            metrics.per_class_f1.iter().sum::<f64>() / self.num_classes as f64
        } else {
            0.0
        };

        metrics
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// Summary metrics of one evaluation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiLabelMetrics {
    /// Fraction of samples with every label correct
    pub subset_accuracy: f64,
    /// Fraction of individual labels correct
    pub hamming_accuracy: f64,
    pub micro_precision: f64,
    pub micro_recall: f64,
    pub micro_f1: f64,
    pub macro_f1: f64,
    pub per_class_f1: Vec<f64>,
    pub num_samples: usize,
}

/// Metrics recorded for one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub test_loss: f64,
    pub learning_rate: f64,
    pub metrics: MultiLabelMetrics,
}

/// Training metrics tracked during training
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingMetrics {
    pub fn add_epoch(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    /// Record with the highest micro-F1; the earliest wins ties
    pub fn best(&self) -> Option<&EpochRecord> {
        self.epochs.iter().fold(None, |best: Option<&EpochRecord>, record| match best {
            Some(b) if record.metrics.micro_f1 <= b.metrics.micro_f1 => Some(b),
            _ => Some(record),
        })
    }
}
