/// Type-state markers for the manager builder
///
/// These types track at compile time whether the two required pieces, the
/// server URL and the transport, have been provided.

use std::marker::PhantomData;

/// Marker trait for URL state
pub trait UrlState {}

/// URL has not been set
pub struct NoUrl;
impl UrlState for NoUrl {}

/// URL has been set
pub struct HasUrl;
impl UrlState for HasUrl {}

/// Marker trait for transport state
pub trait TransportState {}

/// Transport has not been set
pub struct NoTransport;
impl TransportState for NoTransport {}

/// Transport has been set
pub struct HasTransport;
impl TransportState for HasTransport {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<U, T> {
    _url: PhantomData<U>,
    _transport: PhantomData<T>,
}

impl<U, T> TypeState<U, T> {
    pub(crate) fn new() -> Self {
        Self {
            _url: PhantomData,
            _transport: PhantomData,
        }
    }
}

impl<U, T> Default for TypeState<U, T> {
    fn default() -> Self {
        Self::new()
    }
}
