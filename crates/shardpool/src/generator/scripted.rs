use crate::{CandidateSource, Kind, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A deterministic [`CandidateSource`] that replays a fixed script.
///
/// Candidates are handed out in order regardless of the requested kind. Once
/// the script runs dry the final value repeats forever, which keeps the
/// sequence infinite while guaranteeing it only ever collides from then on.
///
/// Useful for reproducing refills in tests and benchmarks.
#[derive(Debug)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Value>>,
    last: Mutex<Option<Value>>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Value>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
        }
    }

    /// Appends more candidates to the end of the script.
    pub fn extend(&self, more: impl IntoIterator<Item = Value>) {
        self.script.lock().extend(more);
    }
}

impl CandidateSource for ScriptedSource {
    fn next(&self, kind: Kind) -> Value {
        let mut last = self.last.lock();
        if let Some(value) = self.script.lock().pop_front() {
            *last = Some(value);
            return value;
        }
        last.unwrap_or(match kind {
            Kind::Int => Value::Int(0),
            Kind::Float => Value::Float(crate::Fixed::from_units(0, 0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_then_repeats_last() {
        let source = ScriptedSource::new([Value::Int(7), Value::Int(101)]);
        let seen: Vec<_> = source.candidates(Kind::Int).take(4).collect();
        assert_eq!(
            seen,
            [Value::Int(7), Value::Int(101), Value::Int(101), Value::Int(101)]
        );
        source.extend([Value::Int(5)]);
        assert_eq!(source.next(Kind::Int), Value::Int(5));
    }
}
