use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_SEARCH_DEBOUNCE: Duration =
  Duration::from_millis(300);

/// Identifies one armed timer. Every
/// new input invalidates the previous
/// token.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct TimerToken(u64);

/// Holds back a rapidly changing value
/// until it has been quiet for
/// `quiet`. Consumers read `stable()`,
/// never the raw input.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
  quiet:      Duration,
  generation: u64,
  pending:    Option<(T, Instant)>,
  stable:     T,
  latest:     T
}

impl<T: Clone + PartialEq> Debouncer<T> {
  pub fn new(
    initial: T,
    quiet: Duration
  ) -> Self {
    Self {
      quiet,
      generation: 0,
      pending: None,
      stable: initial.clone(),
      latest: initial
    }
  }

  /// Record a new raw value and re-arm
  /// the timer.
  pub fn input(
    &mut self,
    value: T,
    now: Instant
  ) -> TimerToken {
    self.generation += 1;
    self.latest = value.clone();
    self.pending =
      Some((value, now + self.quiet));
    TimerToken(self.generation)
  }

  /// Timer callback. Tokens superseded
  /// by later input are ignored.
  /// Returns the new stable value if it
  /// changed.
  pub fn fire(
    &mut self,
    token: TimerToken,
    now: Instant
  ) -> Option<&T> {
    if token.0 != self.generation {
      return None;
    }
    self.poll(now)
  }

  /// Promote the pending value once
  /// its deadline has passed.
  pub fn poll(
    &mut self,
    now: Instant
  ) -> Option<&T> {
    let due = self
      .pending
      .as_ref()
      .is_some_and(|(_, at)| now >= *at);
    if !due {
      return None;
    }
    let (value, _) = self.pending.take()?;
    if value == self.stable {
      return None;
    }
    self.stable = value;
    tracing::trace!(
      generation = self.generation,
      "debounced value settled"
    );
    Some(&self.stable)
  }

  /// Drop the pending value without
  /// promoting it.
  pub fn cancel(&mut self) {
    self.generation += 1;
    self.pending = None;
    self.latest = self.stable.clone();
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.pending.as_ref().map(|(_, at)| *at)
  }

  pub fn stable(&self) -> &T {
    &self.stable
  }

  /// Most recent raw input, for echoing
  /// back into the text field.
  pub fn latest(&self) -> &T {
    &self.latest
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Sleep until the pending value
  /// settles and return the stable
  /// value.
  pub async fn settled(&mut self) -> &T {
    while let Some(deadline) =
      self.deadline()
    {
      tokio::time::sleep_until(deadline)
        .await;
      self.poll(Instant::now());
    }
    &self.stable
  }
}
