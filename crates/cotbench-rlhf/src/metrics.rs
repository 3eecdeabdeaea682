//! Training metrics logging

/// Step metrics printed on the logging cadence
#[derive(Debug, Clone)]
pub struct StepMetrics {
    /// Mean fine-tuning loss over the step
    pub loss: f32,
    /// Mean rollout reward over the step
    pub mean_reward: f32,
    /// Current learning rate
    pub learning_rate: f32,
    /// Step number
    pub step: usize,
}

/// Cadenced stdout logger for the training loop
pub struct MetricsLogger {
    log_interval: usize,
    step: usize,
}

impl MetricsLogger {
    /// Create a logger that prints every `log_interval` steps
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
            step: 0,
        }
    }

    /// Record one step, printing when the cadence comes up
    pub fn log_step(&mut self, loss: f32, mean_reward: f32, learning_rate: f32) {
        self.step += 1;

        if self.step % self.log_interval == 0 {
            let metrics = StepMetrics {
                loss,
                mean_reward,
                learning_rate,
                step: self.step,
            };
            self.print_metrics(&metrics);
        }
    }

    fn print_metrics(&self, metrics: &StepMetrics) {
        println!(
            "Step {}: loss={:.6}, reward={:.4}, lr={:.2e}",
            metrics.step, metrics.loss, metrics.mean_reward, metrics.learning_rate
        );
    }

    /// Current step number
    pub fn step(&self) -> usize {
        self.step
    }
}
