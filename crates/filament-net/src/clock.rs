use filament_core::error::FilamentError;
use filament_core::types::Tick;
use tracing::{trace, warn};

type Listener = Box<dyn FnMut(Tick) -> Result<(), FilamentError>>;

struct Subscription {
    name: String,
    listener: Listener,
}

/// The logical clock: a monotonic tick counter with ordered subscribers.
///
/// The target tick interval is carried for the host's pacing only; nothing
/// in the core derives correctness from wall-clock spacing. Listener
/// failures are logged and swallowed — one misbehaving subscriber cannot
/// stall the tick loop or cancel its peers.
pub struct Clock {
    current: Tick,
    tick_interval_ms: u64,
    subscriptions: Vec<Subscription>,
}

impl Clock {
    pub fn new(tick_interval_ms: u64) -> Self {
        Self {
            current: 0,
            tick_interval_ms,
            subscriptions: Vec::new(),
        }
    }

    pub fn now(&self) -> Tick {
        self.current
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    /// Register a listener. Listeners run in subscription order on every
    /// tick.
    pub fn subscribe(
        &mut self,
        name: impl Into<String>,
        listener: impl FnMut(Tick) -> Result<(), FilamentError> + 'static,
    ) {
        self.subscriptions.push(Subscription {
            name: name.into(),
            listener: Box::new(listener),
        });
    }

    /// Advance by one tick and notify subscribers.
    pub fn advance(&mut self) -> Tick {
        self.advance_to(self.current + 1)
    }

    /// Advance to tick `n`, notifying subscribers once per intermediate
    /// tick. Idempotent for any `n ≤ current`.
    pub fn advance_to(&mut self, n: Tick) -> Tick {
        while self.current < n {
            self.current += 1;
            let tick = self.current;
            trace!(tick, "clock tick");
            for sub in &mut self.subscriptions {
                if let Err(e) = (sub.listener)(tick) {
                    warn!(listener = %sub.name, tick, error = %e, "tick listener failed");
                }
            }
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_run_in_subscription_order() {
        let seen: Rc<RefCell<Vec<(&'static str, Tick)>>> = Rc::default();
        let mut clock = Clock::new(100);

        let a = Rc::clone(&seen);
        clock.subscribe("a", move |t| {
            a.borrow_mut().push(("a", t));
            Ok(())
        });
        let b = Rc::clone(&seen);
        clock.subscribe("b", move |t| {
            b.borrow_mut().push(("b", t));
            Ok(())
        });

        clock.advance();
        clock.advance();
        assert_eq!(
            *seen.borrow(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn failing_listener_does_not_stop_others() {
        let seen: Rc<RefCell<u32>> = Rc::default();
        let mut clock = Clock::new(100);
        clock.subscribe("broken", |_| {
            Err(FilamentError::VerificationError("listener bug".into()))
        });
        let counter = Rc::clone(&seen);
        clock.subscribe("counting", move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        clock.advance();
        assert_eq!(*seen.borrow(), 1);
        assert_eq!(clock.now(), 1);
    }

    #[test]
    fn advance_to_is_idempotent_for_past_ticks() {
        let mut clock = Clock::new(100);
        clock.advance_to(5);
        assert_eq!(clock.now(), 5);
        assert_eq!(clock.advance_to(3), 5);
        assert_eq!(clock.now(), 5);
    }
}
