use crate::domain::change::{ChangeEvent, Direction};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub has_change: bool,
    /// `None` whenever `has_change` is false.
    pub direction: Option<Direction>,
    pub delta: f64,
}

impl Classification {
    pub fn into_event(self, ticker: &str, previous: f64, current: f64) -> Option<ChangeEvent> {
        let direction = self.direction.filter(|_| self.has_change)?;
        Some(ChangeEvent {
            ticker: ticker.to_string(),
            previous_score: previous,
            current_score: current,
            delta: self.delta,
            direction,
        })
    }
}

/// `threshold` is an absolute score-point value. Equality counts as a change.
pub fn classify(current: f64, previous: f64, threshold: f64) -> Classification {
    let delta = current - previous;
    let has_change = delta.abs() >= threshold;
    let direction = has_change.then(|| {
        if delta > 0.0 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    });

    Classification {
        has_change,
        direction,
        delta,
    }
}
