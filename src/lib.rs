//! Generic undo/redo transaction engine.
//!
//! Editing code brackets a change with [`core::buffer::TransactionBuffer::begin`]
//! and [`core::buffer::TransactionBuffer::end`], and calls `save_object` or
//! `save_array` before each mutation. Objects take part by implementing
//! [`object::Transactable`]; the engine only ever sees their bytes and the
//! object/name references they write.
//!
//! # Examples
//!
//! ```
//! use std::{cell::RefCell, rc::Rc};
//!
//! use transbuf::{
//!     archive::{Archive, Archived},
//!     config::BufferConfig,
//!     core::buffer::TransactionBuffer,
//!     object::Transactable,
//!     types::ObjectRef,
//! };
//!
//! #[derive(Default)]
//! struct Actor {
//!     position: [f64; 3],
//! }
//!
//! impl Transactable for Actor {
//!     fn serialize(&mut self, ar: &mut dyn Archive) {
//!         self.position.archive(ar);
//!     }
//! }
//!
//! let actor = Rc::new(RefCell::new(Actor::default()));
//! let handle = ObjectRef::from(&actor);
//! let mut buffer = TransactionBuffer::new(BufferConfig::default());
//!
//! buffer.begin("Editor", "Move");
//! buffer.save_object(&handle);
//! actor.borrow_mut().position = [1.0, 2.0, 3.0];
//! buffer.end();
//!
//! assert!(buffer.undo());
//! assert_eq!(actor.borrow().position, [0.0, 0.0, 0.0]);
//! assert!(buffer.can_redo().is_ok());
//! assert!(buffer.redo());
//! assert_eq!(actor.borrow().position, [1.0, 2.0, 3.0]);
//! ```
#![deny(missing_docs)]

/// Bidirectional archive and archived value types.
pub mod archive;
/// Buffer configuration.
pub mod config;
/// Records, transactions and the transaction buffer.
pub mod core;
/// Buffer event notifications.
pub mod events;
/// Contracts implemented by transactable objects.
pub mod object;
/// Shared handles and enums.
pub mod types;
