//! Business logic services
//!
//! This module contains business logic separated from HTTP concerns.
//! Services are stateless and generic over the store they operate on, so
//! they can be exercised with mocked stores.

pub mod images;
pub mod registry;
