//! Reverse-order release of acquired handles.
use std::fmt;

type Release = Box<dyn FnOnce()>;

/// Stack of release actions, run last-in first-out when the stack is dropped
/// or [`release_all`](Self::release_all) is called.
///
/// Every handle is pushed right after it is acquired, so an early return at
/// any point of the bring-up still releases exactly what exists, in reverse
/// order.
#[derive(Default)]
pub struct TeardownStack {
    entries: Vec<(&'static str, Release)>,
}

impl TeardownStack {
    /// An empty stack.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `release` to run before everything pushed earlier.
    pub fn push(&mut self, label: &'static str, release: impl FnOnce() + 'static) {
        log::trace!("acquired {label}");
        self.entries.push((label, Box::new(release)));
    }

    /// Number of pending release actions.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels of pending release actions, oldest first.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(label, _)| *label)
    }

    /// Run every pending release action, newest first.
    pub fn release_all(&mut self) {
        while let Some((label, release)) = self.entries.pop() {
            log::debug!("releasing {label}");
            release();
        }
    }
}

impl fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.labels()).finish()
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    fn recording(log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str) -> impl FnOnce() {
        let log = Rc::clone(log);
        move || log.borrow_mut().push(label)
    }

    #[test]
    fn releases_in_reverse_order_on_drop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut stack = TeardownStack::new();
            stack.push("instance", recording(&log, "instance"));
            stack.push("messenger", recording(&log, "messenger"));
            stack.push("surface", recording(&log, "surface"));
            stack.push("device", recording(&log, "device"));
            assert_eq!(stack.len(), 4);
            assert!(log.borrow().is_empty());
        }

        assert_eq!(
            *log.borrow(),
            vec!["device", "surface", "messenger", "instance"]
        );
    }

    #[test]
    fn early_exit_releases_only_what_was_acquired() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let run = |fail_after: usize| -> Result<TeardownStack, ()> {
            let mut stack = TeardownStack::new();
            for (i, label) in ["instance", "messenger", "surface", "device"]
                .into_iter()
                .enumerate()
            {
                if i == fail_after {
                    return Err(());
                }
                stack.push(label, recording(&log, label));
            }
            Ok(stack)
        };

        assert!(run(2).is_err());
        assert_eq!(*log.borrow(), vec!["messenger", "instance"]);
    }

    #[test]
    fn release_all_empties_the_stack() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stack = TeardownStack::new();
        stack.push("a", recording(&log, "a"));
        stack.push("b", recording(&log, "b"));
        assert_eq!(stack.labels().collect::<Vec<_>>(), vec!["a", "b"]);

        stack.release_all();
        assert!(stack.is_empty());
        drop(stack);
        assert_eq!(*log.borrow(), vec!["b", "a"]);
    }
}
