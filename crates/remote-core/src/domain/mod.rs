//! Domain entities for the remote layout model.
//!
//! Everything in here is pure data and logic: no sockets, no files, no UI.
//!
//! # How the pieces fit (for beginners)
//!
//! A remote is a tree of elements.  The tree lives in an [`graph::ElementGraph`]
//! arena where elements refer to each other by [`element::ElementId`] instead
//! of by pointer.  Each element's position and size are described by layout
//! constraints ("a.left = b.right + 8"), stored in the same arena.  A
//! [`constraint_manager::ConstraintManager`] borrows the arena for one element
//! at a time and performs the editing operations (align, resize, move, shrink
//! to fit) that keep the constraints consistent.

/// Points, sizes, rectangles and the per-element metrics table.
pub mod geometry;

/// Elements of the remote tree and their presentation attributes.
pub mod element;

/// Layout attributes, relations and the constraint record itself.
pub mod constraint;

/// The element arena, constraint storage and the queries over both.
pub mod graph;

/// Editing operations on the constraints around a single element.
pub mod constraint_manager;
