use rand::Rng;

/// Default probability that a processing attempt fails
pub const DEFAULT_FAILURE_RATE: f64 = 0.3;

/// Strategy deciding whether a single processing attempt fails.
///
/// Evaluated exactly once per attempt. Closures returning `bool` implement it,
/// which lets tests script deterministic outcomes.
pub trait FailurePolicy: Send + Sync {
    fn should_fail(&self) -> bool;
}

impl<F> FailurePolicy for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_fail(&self) -> bool {
        self()
    }
}

/// Fails each attempt independently with a fixed probability
#[derive(Debug, Clone, Copy)]
pub struct RandomFailure {
    rate: f64,
}

impl RandomFailure {
    /// Create a policy failing with the given probability (clamped to `0.0..=1.0`)
    pub fn new(rate: f64) -> Self {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        Self { rate }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Default for RandomFailure {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_RATE)
    }
}

impl FailurePolicy for RandomFailure {
    fn should_fail(&self) -> bool {
        rand::thread_rng().gen_bool(self.rate)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFail;

impl FailurePolicy for NeverFail {
    fn should_fail(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFail;

impl FailurePolicy for AlwaysFail {
    fn should_fail(&self) -> bool {
        true
    }
}
