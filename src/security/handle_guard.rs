//! RAII rollback for participant creation (§9 design note): each handle
//! acquired during `pss::check_create_participant` is wrapped in a
//! `HandleGuard` that returns it to the owning plugin on drop. Once every
//! step succeeds the guards are `disarm()`'d so the handles survive into the
//! live participant record; any early `?` return drops the not-yet-disarmed
//! guards in reverse declaration order, replaying the teacher's
//! deeply-nested cleanup-on-error goto chains as ordinary scope exit.

/// Wraps a single plugin-owned handle plus the closure that returns it.
/// `armed` starts `true`; `disarm()` flips it to `false` so `Drop` becomes a
/// no-op once the handle has been adopted by a live record.
pub struct HandleGuard<F: FnOnce()> {
  armed: bool,
  release: Option<F>,
}

impl<F: FnOnce()> HandleGuard<F> {
  pub fn new(release: F) -> Self {
    Self {
      armed: true,
      release: Some(release),
    }
  }

  /// Call once the handle has been committed to a live record. After this,
  /// dropping the guard does nothing.
  pub fn disarm(mut self) {
    self.armed = false;
    // release is never invoked; drop it without calling.
    self.release.take();
  }
}

impl<F: FnOnce()> Drop for HandleGuard<F> {
  fn drop(&mut self) {
    if self.armed {
      if let Some(release) = self.release.take() {
        release();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;

  #[test]
  fn unarmed_guard_releases_on_drop() {
    static RELEASED: AtomicU32 = AtomicU32::new(0);
    RELEASED.store(0, Ordering::SeqCst);
    {
      let _guard = HandleGuard::new(|| {
        RELEASED.fetch_add(1, Ordering::SeqCst);
      });
    }
    assert_eq!(RELEASED.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn disarmed_guard_does_not_release() {
    static RELEASED: AtomicU32 = AtomicU32::new(0);
    RELEASED.store(0, Ordering::SeqCst);
    {
      let guard = HandleGuard::new(|| {
        RELEASED.fetch_add(1, Ordering::SeqCst);
      });
      guard.disarm();
    }
    assert_eq!(RELEASED.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn multiple_guards_release_in_reverse_order() {
    let order = std::sync::Mutex::new(Vec::new());
    {
      let _first = HandleGuard::new(|| order.lock().unwrap().push(1));
      let _second = HandleGuard::new(|| order.lock().unwrap().push(2));
      let _third = HandleGuard::new(|| order.lock().unwrap().push(3));
    }
    assert_eq!(*order.lock().unwrap(), vec![3, 2, 1]);
  }
}
