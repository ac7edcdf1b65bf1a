//! Connection plumbing shared by Engram's networked vector store adapters.
//!
//! - [`Transport`] is the vendor boundary: one live client for one server.
//!   [`HttpTransport`] talks to REST APIs through reqwest; [`FakeTransport`]
//!   replays scripted responses in tests.
//! - [`ConnectionPool`] shares clients across adapters whose
//!   [`ConnectionParams`] normalize to the same [`ConnectionKey`].
//! - [`Connector`] is what an adapter holds: it acquires a pooled or private
//!   client with retry and releases it on disconnect.

mod connector;
mod params;
mod pool;
mod transport;

pub use connector::Connector;
pub use params::{ConnectionKey, ConnectionOptions, ConnectionParams};
pub use pool::{ConnectionPool, ConnectionStats, PoolStats, PooledConnection};
pub use transport::{
    Endpoint, FakeTransport, FakeTransportFactory, HealthProbe, HttpTransport,
    HttpTransportFactory, Method, Transport, TransportFactory, TransportRequest,
    TransportResponse,
};
