use crate::{Kind, Value};

/// A source of raw candidate values.
///
/// Candidates are not guaranteed unique; filtering them is the registry's job.
/// Float candidates must already be rounded to their final precision so that
/// two draws that round alike collide in the registry instead of bypassing it.
///
/// # Example
/// ```
/// use shardpool::{CandidateSource, Kind, Value};
///
/// struct Sevens;
/// impl CandidateSource for Sevens {
///     fn next(&self, _kind: Kind) -> Value {
///         Value::Int(7)
///     }
/// }
///
/// let first: Vec<_> = Sevens.candidates(Kind::Int).take(2).collect();
/// assert_eq!(first, [Value::Int(7), Value::Int(7)]);
/// ```
pub trait CandidateSource: Send + Sync {
    /// Draws one candidate of `kind`.
    fn next(&self, kind: Kind) -> Value;

    /// A lazy, infinite stream of candidates of `kind`.
    fn candidates(&self, kind: Kind) -> impl Iterator<Item = Value> + '_
    where
        Self: Sized,
    {
        core::iter::repeat_with(move || self.next(kind))
    }
}
