//! Typed - 型付きペイロード API
//!
//! `Task.parameters` は不透明な bytes です。この層で TaskKind ごとの型に対応付けます。
//!
//! - **表層（Typed）**: `TaskKind` trait, `Handler<T>` trait
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod codec;
pub mod handler;
pub mod registry;
pub mod task;

pub use self::codec::PayloadCodec;
pub use self::handler::{DynHandler, Handler, TypedHandler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::TaskKind;
