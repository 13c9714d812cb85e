//! Synthetic Workloads
//!
//! A workload produces one unit of compute work per `step()` call and may
//! report a metric. Two variants are provided:
//!
//! - [`MatMulWorkload`]: repeated dense matrix multiplication
//! - [`TrainingWorkload`]: a freshly randomized tiny network trained on
//!   random data every step
//!
//! Neither variant judges quality. Every step that returns `Ok` counts as
//! a completed iteration, whatever its metric.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tensor::Matrix;

/// Errors raised by workloads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkloadError {
    /// A workload parameter is out of range (setup time)
    #[error("invalid workload parameter: {0}")]
    InvalidParameter(String),

    /// Operand shapes do not line up
    #[error("shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    /// A single iteration failed
    #[error("workload step failed: {0}")]
    StepFailed(String),
}

/// Result of one workload iteration, as recorded by a lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadOutcome {
    /// Time since the runner started when the iteration finished
    pub completed_at: Duration,
    /// Optional quality metric reported by the workload
    pub metric: Option<f64>,
    /// Whether the iteration completed
    pub ok: bool,
}

impl WorkloadOutcome {
    /// Outcome of a completed iteration.
    pub fn succeeded(completed_at: Duration, metric: Option<f64>) -> Self {
        Self {
            completed_at,
            metric,
            ok: true,
        }
    }

    /// Outcome of a failed iteration.
    pub fn failed(completed_at: Duration) -> Self {
        Self {
            completed_at,
            metric: None,
            ok: false,
        }
    }
}

/// One unit of synthetic, resource-saturating work.
///
/// Implementations are shared by every lane, so `step` takes `&self`
/// and must be safe to call from several threads at once.
pub trait Workload: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Runs one iteration and returns its metric, if it has one.
    fn step(&self) -> Result<Option<f64>, WorkloadError>;
}

/// Multiplies two fixed random square matrices every step.
///
/// The metric is the mean of the product, which keeps the result
/// observable so the multiplication cannot be optimized away.
#[derive(Debug)]
pub struct MatMulWorkload {
    size: usize,
    lhs: Matrix,
    rhs: Matrix,
}

impl MatMulWorkload {
    /// Creates a workload over two random `size × size` matrices.
    pub fn new(size: usize) -> Result<Self, WorkloadError> {
        Self::with_rng(size, &mut StdRng::from_entropy())
    }

    /// Creates a workload with a deterministic seed.
    pub fn seeded(size: usize, seed: u64) -> Result<Self, WorkloadError> {
        Self::with_rng(size, &mut StdRng::seed_from_u64(seed))
    }

    fn with_rng(size: usize, rng: &mut StdRng) -> Result<Self, WorkloadError> {
        if size == 0 {
            return Err(WorkloadError::InvalidParameter(
                "matrix size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            size,
            lhs: Matrix::random_uniform(size, size, 0.0, 1.0, rng)?,
            rhs: Matrix::random_uniform(size, size, 0.0, 1.0, rng)?,
        })
    }

    /// Returns the matrix dimension.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Workload for MatMulWorkload {
    fn name(&self) -> &str {
        "matmul"
    }

    fn step(&self) -> Result<Option<f64>, WorkloadError> {
        let product = self.lhs.matmul(&self.rhs)?;
        Ok(Some(product.mean()))
    }
}

/// Tuning knobs for [`TrainingWorkload`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingParams {
    /// Number of input features
    pub inputs: usize,
    /// Number of training rows
    pub samples: usize,
    /// Inclusive range the hidden layer width is drawn from
    pub hidden: (usize, usize),
    /// Gradient descent passes over the data per step
    pub epochs: usize,
    /// Range the learning rate is drawn from
    pub learning_rate: (f32, f32),
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            inputs: 32,
            samples: 256,
            hidden: (16, 128),
            epochs: 5,
            learning_rate: (0.001, 0.05),
        }
    }
}

/// Trains a randomly configured two-layer network each step.
///
/// Every iteration draws a new hidden width and learning rate, builds the
/// network from scratch, runs a few epochs of full-batch gradient descent
/// on random regression data and discards the model. The metric is the
/// final mean squared error.
#[derive(Debug, Clone)]
pub struct TrainingWorkload {
    params: TrainingParams,
}

impl TrainingWorkload {
    /// Creates a training workload, validating the parameters.
    pub fn new(params: TrainingParams) -> Result<Self, WorkloadError> {
        if params.inputs == 0 || params.samples == 0 || params.epochs == 0 {
            return Err(WorkloadError::InvalidParameter(
                "inputs, samples and epochs must be at least 1".to_string(),
            ));
        }
        if params.hidden.0 == 0 || params.hidden.0 > params.hidden.1 {
            return Err(WorkloadError::InvalidParameter(format!(
                "invalid hidden width range {:?}",
                params.hidden
            )));
        }
        let (lr_min, lr_max) = params.learning_rate;
        if !(lr_min > 0.0 && lr_min < lr_max) {
            return Err(WorkloadError::InvalidParameter(format!(
                "invalid learning rate range {:?}",
                params.learning_rate
            )));
        }
        Ok(Self { params })
    }

    /// Returns the workload parameters.
    pub fn params(&self) -> &TrainingParams {
        &self.params
    }
}

impl Workload for TrainingWorkload {
    fn name(&self) -> &str {
        "training"
    }

    fn step(&self) -> Result<Option<f64>, WorkloadError> {
        let p = &self.params;
        let mut rng = StdRng::from_entropy();

        let hidden = rng.gen_range(p.hidden.0..=p.hidden.1);
        let learning_rate = rng.gen_range(p.learning_rate.0..p.learning_rate.1);

        let inputs = Matrix::random_normal(p.samples, p.inputs, 0.0, 1.0, &mut rng)?;
        let targets = Matrix::random_normal(p.samples, 1, 0.0, 1.0, &mut rng)?;
        let mut network = TinyNetwork::random(p.inputs, hidden, &mut rng)?;

        let mut loss = 0.0;
        for _ in 0..p.epochs {
            loss = network.train_batch(&inputs, &targets, learning_rate)?;
        }

        Ok(Some(loss))
    }
}

/// Dense → ReLU → dense regression network with a single output.
struct TinyNetwork {
    w1: Matrix,
    b1: Vec<f32>,
    w2: Matrix,
    b2: Vec<f32>,
}

impl TinyNetwork {
    fn random(inputs: usize, hidden: usize, rng: &mut StdRng) -> Result<Self, WorkloadError> {
        // He initialisation for the ReLU layer
        let std1 = (2.0 / inputs as f32).sqrt();
        let std2 = (1.0 / hidden as f32).sqrt();

        Ok(Self {
            w1: Matrix::random_normal(inputs, hidden, 0.0, std1, rng)?,
            b1: vec![0.0; hidden],
            w2: Matrix::random_normal(hidden, 1, 0.0, std2, rng)?,
            b2: vec![0.0; 1],
        })
    }

    /// One full-batch gradient descent update; returns the loss before it.
    fn train_batch(
        &mut self,
        inputs: &Matrix,
        targets: &Matrix,
        learning_rate: f32,
    ) -> Result<f64, WorkloadError> {
        let batch = inputs.shape().0 as f32;

        let mut pre_activation = inputs.matmul(&self.w1)?;
        pre_activation.add_row(&self.b1)?;
        let activation = pre_activation.map(|v| v.max(0.0));

        let mut predictions = activation.matmul(&self.w2)?;
        predictions.add_row(&self.b2)?;

        let diff = predictions.sub(targets)?;
        let loss = diff.mean_square();

        let grad_out = diff.map(|v| 2.0 * v / batch);
        let grad_w2 = activation.transpose().matmul(&grad_out)?;
        let grad_b2 = grad_out.column_sums();

        let grad_hidden = grad_out
            .matmul(&self.w2.transpose())?
            .zip_map(&pre_activation, |g, z| if z > 0.0 { g } else { 0.0 })?;
        let grad_w1 = inputs.transpose().matmul(&grad_hidden)?;
        let grad_b1 = grad_hidden.column_sums();

        self.w2.add_scaled(&grad_w2, -learning_rate)?;
        self.w1.add_scaled(&grad_w1, -learning_rate)?;
        for (b, g) in self.b2.iter_mut().zip(&grad_b2) {
            *b -= learning_rate * g;
        }
        for (b, g) in self.b1.iter_mut().zip(&grad_b1) {
            *b -= learning_rate * g;
        }

        Ok(loss)
    }
}

/// Workload variants selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    /// Dense matrix multiplication
    #[serde(alias = "matrix")]
    MatMul,
    /// Tiny network training
    Training,
}

impl WorkloadKind {
    /// Builds the selected workload.
    ///
    /// `matrix_size` only applies to [`WorkloadKind::MatMul`].
    pub fn build(&self, matrix_size: usize) -> Result<Arc<dyn Workload>, WorkloadError> {
        let workload: Arc<dyn Workload> = match self {
            Self::MatMul => Arc::new(MatMulWorkload::new(matrix_size)?),
            Self::Training => Arc::new(TrainingWorkload::new(TrainingParams::default())?),
        };
        Ok(workload)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MatMul => write!(f, "matmul"),
            Self::Training => write!(f, "training"),
        }
    }
}

impl FromStr for WorkloadKind {
    type Err = WorkloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "matmul" | "matrix" => Ok(Self::MatMul),
            "training" | "train" => Ok(Self::Training),
            other => Err(WorkloadError::InvalidParameter(format!(
                "unknown workload '{}' (expected 'matmul' or 'training')",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_training() -> TrainingParams {
        TrainingParams {
            inputs: 4,
            samples: 16,
            hidden: (2, 8),
            epochs: 3,
            learning_rate: (0.001, 0.01),
        }
    }

    #[test]
    fn test_matmul_rejects_zero_size() {
        assert!(MatMulWorkload::new(0).is_err());
    }

    #[test]
    fn test_matmul_step_reports_metric() {
        let workload = MatMulWorkload::seeded(16, 3).unwrap();
        let metric = workload.step().unwrap().unwrap();

        // Entries in [0, 1), so each product entry is in [0, 16)
        assert!(metric > 0.0 && metric < 16.0);
        assert_eq!(workload.name(), "matmul");
        assert_eq!(workload.size(), 16);
    }

    #[test]
    fn test_matmul_step_is_deterministic() {
        let workload = MatMulWorkload::seeded(8, 11).unwrap();
        assert_eq!(workload.step().unwrap(), workload.step().unwrap());
    }

    #[test]
    fn test_training_step_reports_finite_loss() {
        let workload = TrainingWorkload::new(small_training()).unwrap();
        let loss = workload.step().unwrap().unwrap();

        assert!(loss.is_finite());
        assert!(loss >= 0.0);
    }

    #[test]
    fn test_training_reduces_loss_on_fixed_data() {
        let mut rng = StdRng::seed_from_u64(5);
        let inputs = Matrix::random_normal(32, 4, 0.0, 1.0, &mut rng).unwrap();
        let targets = Matrix::random_normal(32, 1, 0.0, 1.0, &mut rng).unwrap();
        let mut network = TinyNetwork::random(4, 16, &mut rng).unwrap();

        let first = network.train_batch(&inputs, &targets, 0.05).unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = network.train_batch(&inputs, &targets, 0.05).unwrap();
        }

        assert!(last < first, "loss should decrease: {} -> {}", first, last);
    }

    #[test]
    fn test_training_params_validated() {
        let mut params = small_training();
        params.hidden = (8, 2);
        assert!(TrainingWorkload::new(params).is_err());

        let mut params = small_training();
        params.epochs = 0;
        assert!(TrainingWorkload::new(params).is_err());

        let mut params = small_training();
        params.learning_rate = (0.0, 0.1);
        assert!(TrainingWorkload::new(params).is_err());
    }

    #[test]
    fn test_workload_kind_parsing() {
        assert_eq!("matmul".parse::<WorkloadKind>().unwrap(), WorkloadKind::MatMul);
        assert_eq!("Training".parse::<WorkloadKind>().unwrap(), WorkloadKind::Training);
        assert!("resnet".parse::<WorkloadKind>().is_err());
    }

    #[test]
    fn test_workload_kind_display_roundtrip() {
        for kind in [WorkloadKind::MatMul, WorkloadKind::Training] {
            assert_eq!(kind.to_string().parse::<WorkloadKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_workload_kind_build() {
        let workload = WorkloadKind::MatMul.build(4).unwrap();
        assert_eq!(workload.name(), "matmul");
        assert!(WorkloadKind::MatMul.build(0).is_err());
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = WorkloadOutcome::succeeded(Duration::from_secs(1), Some(0.5));
        assert!(ok.ok);
        assert_eq!(ok.metric, Some(0.5));

        let failed = WorkloadOutcome::failed(Duration::from_secs(2));
        assert!(!failed.ok);
        assert_eq!(failed.metric, None);
    }
}
