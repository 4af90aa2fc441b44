use kernax_codegen::Builtin;
use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("no derivative rule for '{builtin}'"))]
    NoDerivative { builtin: Builtin },

    #[snafu(display("reverse mode does not support {construct}"))]
    Unsupported { construct: String },

    #[snafu(display("loop over '{counter}' cannot be reversed: {reason}"))]
    IrreversibleLoop { counter: String, reason: String },
}
