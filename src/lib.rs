//! trpc-rs-core - transport, protocol-checking, overload-control and
//! object-pool core of a multi-protocol RPC runtime
//!
//! This crate is the connection-and-message plumbing a framed RPC server
//! sits on: accept/bind adapters, a generic message-checking contract any
//! wire format can implement, a sharded connection registry, rate-limiting
//! flow controllers, object pools for the hot allocation paths, and a
//! hierarchical timing wheel for per-request deadlines. The HTTP/1.x parser
//! and server loop this core grew out of ship alongside it as one concrete
//! protocol implementation, not the only one the core supports.
//!
//! # Modules
//!
//! - [`transport`]: addresses, connection metadata/ids, the non-contiguous
//!   read buffer, bind adapters and the connection registry.
//! - [`protocol`]: the [`protocol::checker::ConnectionHandler`] framing
//!   contract, chunked transfer-encoding, stream demultiplexing, and the
//!   connection preface handshake.
//! - [`overload`]: flow-control limiter algorithms and the registry that
//!   looks them up by service/method.
//! - [`pool`]: fixed-capacity object pools for per-connection buffers.
//! - [`timing_wheel`]: the hierarchical wheel used to track request
//!   deadlines without a timer-per-request.
//! - [`filter`]: the cross-cutting plugin-point mechanism filters (like the
//!   overload controller) attach to.
//! - [`error`]: the crate-wide conceptual error taxonomy.
//!
//! # Quick start (HTTP/1.x surface)
//!
//! ```no_run
//! use trpc_rs_core::{Server, Handler, Request, Response, Handled, StatusCode};
//! use tokio::net::TcpListener;
//!
//! struct MyHandler;
//!
//! impl Handler for MyHandler {
//!     async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
//!         resp.status(StatusCode::Ok).body("Hello world!")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .handler(MyHandler)
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
pub(crate) mod http {
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
}
pub(crate) mod errors;
pub mod limits;

pub mod config;
pub mod error;
pub mod filter;
#[cfg(feature = "overload-control")]
pub mod overload;
pub mod pool;
pub mod protocol;
pub mod send_queue;
pub mod timing_wheel;
pub mod transport;

/// Test-only tracing init, so the `tracing::{debug,warn,error}` call sites
/// throughout this crate have somewhere to go under `cargo test -- --nocapture`.
#[cfg(test)]
pub(crate) mod test_support {
    pub(crate) fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
    }
}

pub use crate::{
    http::{
        query,
        request::Request,
        response::{
            write::{BodyWriter, WriteBuffer},
            Handled, Response,
        },
        types::{Method, StatusCode, Url, Version},
    },
    server::{
        connection::{ConnectionData, ConnectionFilter},
        server_impl::{Handler, Server, ServerBuilder},
    },
};

#[doc(hidden)]
pub fn run_test<F: FnOnce(&Request, &mut Response) -> Handled>(f: F) {
    f(
        &Request::new(&crate::limits::ReqLimits::default()),
        &mut Response::new(&crate::limits::RespLimits::default()),
    );
}

#[doc(hidden)]
#[macro_export]
macro_rules! impt_default_handler {
    ($name:ident) => {
        use trpc_rs_core::{Handled, Handler, Request, Response, StatusCode};
        struct $name;

        // `<()>` to check functionality
        impl Handler<()> for $name {
            async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
                resp.status(StatusCode::Ok).body("Hello world!")
            }
        }
    };
}
