//! Function options.

/// How Jacobians pick between forward and reverse sweeps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdMode {
    /// Pick whichever mode needs fewer weighted sweeps.
    #[default]
    Automatic,
    /// Always seed inputs (one sweep per column color).
    Forward,
    /// Always seed outputs (one sweep per row color).
    Reverse,
}

/// Options shared by scalar- and matrix-graph functions.
///
/// ```
/// use skein_expr::{AdMode, FunctionOptions};
///
/// let opts = FunctionOptions::new("residual")
///     .ad_mode(AdMode::Reverse)
///     .compress(false);
/// assert_eq!(opts.name, "residual");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionOptions {
    pub name: String,
    pub ad_mode: AdMode,
    /// Cost of a forward sweep relative to a reverse one, in `[0, 1]`.
    /// Forward is chosen when `w * n_fwd <= (1 - w) * n_adj`.
    pub ad_weight: f64,
    /// Color Jacobian columns/rows to reduce the number of sweeps.
    pub compress: bool,
}

impl FunctionOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn ad_mode(mut self, mode: AdMode) -> Self {
        self.ad_mode = mode;
        self
    }

    /// Set the forward-sweep weight, clamped to `[0, 1]`.
    pub fn ad_weight(mut self, w: f64) -> Self {
        self.ad_weight = w.clamp(0.0, 1.0);
        self
    }

    pub fn compress(mut self, on: bool) -> Self {
        self.compress = on;
        self
    }

    /// Same options under another name, for derived functions.
    pub(crate) fn derived(&self, name: String) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }
}

impl Default for FunctionOptions {
    fn default() -> Self {
        Self {
            name: "unnamed".into(),
            ad_mode: AdMode::Automatic,
            ad_weight: 0.5,
            compress: true,
        }
    }
}
