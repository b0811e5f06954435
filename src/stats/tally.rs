//! Monotone sharded tally.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use super::{Observable, NUM_COMPONENTS, THREAD_SLOT_INDEX};

/// A monotone counter spread over cache-padded per-thread slots.
///
/// `add` touches only the calling thread's slot; `value` sums every slot.
/// Tallies never go down and cannot be reset.
///
/// # Examples
///
/// ```rust
/// use contavisite::stats::{Observable, Tally};
/// use std::sync::Arc;
/// use std::thread;
///
/// let tally = Arc::new(Tally::new().with_name("visits"));
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let t = Arc::clone(&tally);
///         thread::spawn(move || {
///             for _ in 0..1000 {
///                 t.add(1);
///             }
///         })
///     })
///     .collect();
///
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert_eq!(tally.value(), 4000);
/// ```
pub struct Tally {
    name: &'static str,
    help: &'static str,
    components: [CachePadded<AtomicUsize>; NUM_COMPONENTS],
}

impl Tally {
    /// Creates an unnamed tally at zero. Usable in `static` items.
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: CachePadded<AtomicUsize> = CachePadded::new(AtomicUsize::new(0));
        Tally {
            name: "",
            help: "",
            components: [ZERO; NUM_COMPONENTS],
        }
    }

    /// Sets the name, returning `self` for chaining.
    pub const fn with_name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Sets the help text, returning `self` for chaining.
    pub const fn with_help(self, help: &'static str) -> Self {
        Self { help, ..self }
    }

    /// Adds `value` to the current thread's slot.
    #[inline]
    pub fn add(&self, value: usize) {
        self.slot().fetch_add(value, Ordering::Relaxed);
    }

    /// Value of the current thread's slot alone.
    #[inline]
    pub fn local_value(&self) -> usize {
        self.slot().load(Ordering::Relaxed)
    }

    #[inline]
    fn slot(&self) -> &AtomicUsize {
        THREAD_SLOT_INDEX.with(|idx| &*self.components[*idx])
    }

    #[inline]
    fn total(&self) -> usize {
        self.components
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .sum()
    }
}

impl Observable for Tally {
    #[inline]
    fn name(&self) -> &str {
        self.name
    }

    #[inline]
    fn value(&self) -> u64 {
        self.total() as u64
    }

    fn help(&self) -> &str {
        self.help
    }
}

impl Default for Tally {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Tally {
    /// Shows only the non-zero slots: `name{ [slot]:value ... }`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, slot) in self.components.iter().enumerate() {
            let val = slot.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new() {
        let tally = Tally::new();
        assert_eq!(tally.value(), 0);
        assert_eq!(tally.name(), "");
        assert_eq!(tally.help(), "");
    }

    #[test]
    fn test_add() {
        let tally = Tally::new();
        tally.add(1);
        tally.add(2);
        assert_eq!(tally.value(), 3);
        assert_eq!(tally.local_value(), 3);
    }

    #[test]
    fn test_builders() {
        let tally = Tally::new().with_name("pulses").with_help("help");
        tally.add(1);
        assert_eq!(tally.name(), "pulses");
        assert_eq!(tally.help(), "help");
        assert_eq!(tally.value(), 1);
    }

    #[test]
    fn test_debug_lists_non_zero_slots() {
        let tally = Tally::new().with_name("t");
        tally.add(2);
        let debug = format!("{:?}", tally);
        assert!(debug.starts_with("t{"));
        assert!(debug.contains(":2"));
        assert!(debug.ends_with('}'));
    }

    #[test]
    fn test_multiple_threads() {
        let tally = Arc::new(Tally::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let t = Arc::clone(&tally);
                thread::spawn(move || {
                    for _ in 0..100 {
                        t.add(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tally.value(), 400);
    }
}
