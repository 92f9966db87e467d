//! Test hooks for pausing the split protocol at chosen points.
//!
//! Hooks are thread-local: a hook fires only on the thread that installed
//! it, so unit tests running in parallel never trip each other's hooks.
//!
//! # Usage
//!
//! ```rust,ignore
//! let tree = Arc::new(tree);
//! let t = Arc::clone(&tree);
//!
//! // Take a crash image right after a split linked its sibling.
//! set_after_split_link_hook(Box::new(move || {
//!     let image = t.pool().crash_image();
//!     // ... reopen and check ...
//! }));
//! ```
//!
//! # Safety
//!
//! These hooks are only available in test builds (`#[cfg(test)]`).

use std::cell::RefCell;

/// Hook type: a boxed closure that takes no arguments.
pub type TestHook = Box<dyn Fn()>;

/// Hook type for separator propagation: receives the target level.
pub type SeparatorHook = Box<dyn Fn(u32)>;

thread_local! {
    /// Called right after a split persisted the sibling link and before the
    /// left node's `last_index` is lowered.
    static AFTER_SPLIT_LINK_HOOK: RefCell<Option<TestHook>> = const { RefCell::new(None) };

    /// Called after a new root is durable and before the root reference is
    /// replaced.
    static BEFORE_ROOT_INSTALL_HOOK: RefCell<Option<TestHook>> = const { RefCell::new(None) };

    /// Called after a split released its latch and before its separator is
    /// stored one level up. The new node is reachable only through the
    /// sibling chain while this runs.
    static BEFORE_SEPARATOR_HOOK: RefCell<Option<SeparatorHook>> = const { RefCell::new(None) };
}

/// Set the hook called after the split link.
///
/// # Panics
/// Panics if the hook was already set and not cleared.
pub fn set_after_split_link_hook(hook: TestHook) {
    AFTER_SPLIT_LINK_HOOK.with(|cell| {
        let mut slot = cell.borrow_mut();
        assert!(
            slot.is_none(),
            "AFTER_SPLIT_LINK_HOOK already set; call clear_after_split_link_hook first"
        );
        *slot = Some(hook);
    });
}

/// Clear the after-split-link hook.
pub fn clear_after_split_link_hook() {
    AFTER_SPLIT_LINK_HOOK.with(|cell| *cell.borrow_mut() = None);
}

/// Call the after-split-link hook if set.
///
/// The hook is taken out while it runs so a nested split inside the hook
/// does not re-enter it.
pub(crate) fn call_after_split_link_hook() {
    let hook: Option<TestHook> = AFTER_SPLIT_LINK_HOOK.with(|cell| cell.borrow_mut().take());
    if let Some(hook) = hook {
        hook();
        AFTER_SPLIT_LINK_HOOK.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                *slot = Some(hook);
            }
        });
    }
}

/// Set the hook called before the root reference is replaced.
///
/// # Panics
/// Panics if the hook was already set and not cleared.
pub fn set_before_root_install_hook(hook: TestHook) {
    BEFORE_ROOT_INSTALL_HOOK.with(|cell| {
        let mut slot = cell.borrow_mut();
        assert!(
            slot.is_none(),
            "BEFORE_ROOT_INSTALL_HOOK already set; call clear_before_root_install_hook first"
        );
        *slot = Some(hook);
    });
}

/// Clear the before-root-install hook.
pub fn clear_before_root_install_hook() {
    BEFORE_ROOT_INSTALL_HOOK.with(|cell| *cell.borrow_mut() = None);
}

/// Call the before-root-install hook if set.
pub(crate) fn call_before_root_install_hook() {
    let hook: Option<TestHook> = BEFORE_ROOT_INSTALL_HOOK.with(|cell| cell.borrow_mut().take());
    if let Some(hook) = hook {
        hook();
        BEFORE_ROOT_INSTALL_HOOK.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                *slot = Some(hook);
            }
        });
    }
}

/// Set the hook called before a separator is stored.
///
/// # Panics
/// Panics if the hook was already set and not cleared.
pub fn set_before_separator_hook(hook: SeparatorHook) {
    BEFORE_SEPARATOR_HOOK.with(|cell| {
        let mut slot = cell.borrow_mut();
        assert!(
            slot.is_none(),
            "BEFORE_SEPARATOR_HOOK already set; call clear_before_separator_hook first"
        );
        *slot = Some(hook);
    });
}

/// Clear the before-separator hook.
pub fn clear_before_separator_hook() {
    BEFORE_SEPARATOR_HOOK.with(|cell| *cell.borrow_mut() = None);
}

/// Call the before-separator hook if set. Taken out while it runs, like the
/// split hook.
pub(crate) fn call_before_separator_hook(level: u32) {
    let hook: Option<SeparatorHook> = BEFORE_SEPARATOR_HOOK.with(|cell| cell.borrow_mut().take());
    if let Some(hook) = hook {
        hook(level);
        BEFORE_SEPARATOR_HOOK.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                *slot = Some(hook);
            }
        });
    }
}

/// Clear all test hooks on this thread.
///
/// Should be called in test teardown.
pub fn clear_all_hooks() {
    clear_after_split_link_hook();
    clear_before_root_install_hook();
    clear_before_separator_hook();
}
