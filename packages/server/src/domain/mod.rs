//! Domain layer: value objects, entities and the persistence collaborator.
//!
//! ドメイン層は他のレイヤーに依存しません。Repository trait の実装は
//! Infrastructure 層が提供します（依存性の逆転）。

pub mod entity;
pub mod error;
pub mod repository;
pub mod value_object;

pub use entity::ConnectionRecord;
pub use error::{RepositoryError, ValueObjectError};
pub use repository::ConnectionRepository;
pub use value_object::{ChatId, ConnectionId, UserId};

#[cfg(test)]
pub use repository::MockConnectionRepository;
