//! Assertion macros for state behaviors.
//!
//! Each macro returns early from the enclosing behavior with a classified
//! [`StateError`](crate::StateError) when its condition is false:
//!
//! - `assert_always!` - must hold no matter what else runs against the cluster
//! - `assert_when_owned!` - holds only if the run owns the target collection
//! - `assert_when_owns_db!` - holds only if the run owns the whole database
//!
//! Whether a conditional failure stops the worker is decided by the run's
//! [`Ownership`](crate::Ownership), not by the behavior.
//!
//! ```ignore
//! builder.state_fn("check", |ctx, data| Box::pin(async move {
//!     let count = ctx.cluster().get_one(&Role::Router)?.count(ctx.collection());
//!     assert_always!(count >= 1, "collection lost every document");
//!     assert_when_owned!(count == 10, "expected 10 documents, found {count}");
//!     Ok(())
//! }));
//! ```

/// Fail fatally unless `condition` holds.
#[macro_export]
macro_rules! assert_always {
    ($condition:expr $(,)?) => {
        $crate::assert_always!($condition, "assertion failed: {}", stringify!($condition))
    };
    ($condition:expr, $($message:tt)+) => {
        if !$condition {
            return Err($crate::StateError::fatal(format!($($message)+)));
        }
    };
}

/// Fail unless `condition` holds; only enforced when the run owns the collection.
#[macro_export]
macro_rules! assert_when_owned {
    ($condition:expr $(,)?) => {
        $crate::assert_when_owned!($condition, "assertion failed: {}", stringify!($condition))
    };
    ($condition:expr, $($message:tt)+) => {
        if !$condition {
            return Err($crate::StateError::when_owned(
                $crate::Scope::Collection,
                format!($($message)+),
            ));
        }
    };
}

/// Fail unless `condition` holds; only enforced when the run owns the database.
#[macro_export]
macro_rules! assert_when_owns_db {
    ($condition:expr $(,)?) => {
        $crate::assert_when_owns_db!($condition, "assertion failed: {}", stringify!($condition))
    };
    ($condition:expr, $($message:tt)+) => {
        if !$condition {
            return Err($crate::StateError::when_owned(
                $crate::Scope::Database,
                format!($($message)+),
            ));
        }
    };
}
