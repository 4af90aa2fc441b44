//! Math functions callable from kernel source.

use kernax_dtype::DType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Tanh,
    Fabs,
    Abs,
    Pow,
    Fmin,
    Fmax,
    Floor,
    Ceil,
    Fmod,
    Erf,
}

impl Builtin {
    pub const ALL: [Builtin; 16] = [
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Exp,
        Self::Log,
        Self::Sqrt,
        Self::Tanh,
        Self::Fabs,
        Self::Abs,
        Self::Pow,
        Self::Fmin,
        Self::Fmax,
        Self::Floor,
        Self::Ceil,
        Self::Fmod,
        Self::Erf,
    ];

    /// Resolve a call name, with or without the `std::` qualifier.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("std::").unwrap_or(name);
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sqrt => "sqrt",
            Self::Tanh => "tanh",
            Self::Fabs => "fabs",
            Self::Abs => "abs",
            Self::Pow => "pow",
            Self::Fmin => "fmin",
            Self::Fmax => "fmax",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Fmod => "fmod",
            Self::Erf => "erf",
        }
    }

    pub const fn arity(&self) -> usize {
        match self {
            Self::Pow | Self::Fmin | Self::Fmax | Self::Fmod => 2,
            _ => 1,
        }
    }

    /// Whether the source transformation knows a derivative for this function.
    pub const fn has_derivative(&self) -> bool {
        !matches!(self, Self::Fmod)
    }

    /// Result type following the `<cmath>` overload set: all-`float` arguments stay
    /// `float`, integral arguments go through `double`, `abs` keeps integers.
    pub fn result_dtype(&self, args: &[DType]) -> DType {
        if matches!(self, Self::Abs) && args.iter().all(|d| !d.is_float()) {
            return args.first().copied().map_or(DType::Int32, |d| DType::promote(d, d));
        }
        if args.iter().all(|d| *d == DType::Float32) { DType::Float32 } else { DType::Float64 }
    }

    pub fn eval(&self, args: &[f64]) -> f64 {
        let x = args.first().copied().unwrap_or(0.0);
        let y = args.get(1).copied().unwrap_or(0.0);
        match self {
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Tanh => x.tanh(),
            Self::Fabs | Self::Abs => x.abs(),
            Self::Pow => x.powf(y),
            Self::Fmin => x.min(y),
            Self::Fmax => x.max(y),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Fmod => x % y,
            Self::Erf => erf(x),
        }
    }
}

impl std::fmt::Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    const A: [f64; 5] = [0.254829592, -0.284496736, 1.421413741, -1.453152027, 1.061405429];
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = A.iter().rev().fold(0.0, |acc, a| acc * t + a) * t;
    sign * (1.0 - poly * (-x * x).exp())
}
