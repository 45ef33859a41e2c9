//! Minimal actor runtime.
//!
//! Each actor owns a private unbounded FIFO inbox and a dedicated task that
//! dequeues one message at a time, so `process` is never re-entered for the
//! same actor and concrete actors need no internal locking. Cross-actor
//! communication is always inbox submission via [`ActorRef::submit`], which
//! never blocks the submitter.
//!
//! Shutdown is cooperative: [`ActorRef::shutdown`] enqueues a sentinel that
//! terminates the loop without reaching `process`. A processing error is
//! logged with the actor's name and stops that actor's loop; there is no
//! supervision or restart.

mod runtime;

pub use runtime::{spawn, Actor, ActorRef, ActorStatus};
