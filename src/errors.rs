use thiserror::Error;

/// Error kinds of the optimization pipeline.
///
/// [`Error::Timeout`] and [`Error::SolverUnknown`] are absorbed by the CDS
/// engine and the subproblem model and reported as regular "no improvement"
/// outcomes. All other kinds abort the current top-level call.
#[derive(Debug, Error)]
pub enum Error {
    /// The parser could not decode the input or required elements are missing.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The preprocessor detected contradictory equivalences, i.e. a variable
    /// that would have to equal its own negation.
    #[error("inconsistent model: {0}")]
    InconsistentModel(String),

    /// A configuration of the provided sample violates the feature model.
    #[error("infeasible configuration: {0}")]
    InfeasibleConfiguration(String),

    /// The verifier rejected the optimized sample.
    #[error("optimized sample does not cover the same interactions as the input sample")]
    CoverageMismatch,

    /// A time-bounded operation ran out of budget before finishing its proof.
    #[error("time budget exhausted")]
    Timeout,

    /// The solver backend returned without a decision.
    #[error("solver returned no decision")]
    SolverUnknown,

    /// An internal consistency check failed. This always indicates a bug.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
