//! Distributed dispatch of fill jobs
//!
//! A cluster session is anything that can run a [`JobFn`] somewhere and hand
//! back its partial result as a future. The view never manages the cluster
//! itself; it only submits jobs while a session is enabled.

mod local;

pub use local::LocalCluster;

pub use crate::fill::job::{JobFn, PartialResult};
use crate::error::ChunkFailure;
use crate::fill::planning::Chunk;
use futures::future::BoxFuture;

/// Handle on an execution cluster
pub trait ClusterSession: Send + Sync {
    /// Run `job` for `chunk`, resolving to its partial result
    ///
    /// Jobs of one fill cycle may complete in any order.
    fn submit(&self, chunk: &Chunk, job: JobFn)
        -> BoxFuture<'static, Result<PartialResult, ChunkFailure>>;

    /// Monitoring URL, if the cluster has one
    fn dashboard_link(&self) -> Option<String> {
        None
    }
}

/// Rewrite a loopback host in a dashboard URL to this machine's hostname
///
/// Links reported by a locally started scheduler point at 127.0.0.1, which is
/// useless from any other machine.
pub fn public_dashboard_link(raw: &str) -> String {
    match hostname::get() {
        Ok(name) => replace_loopback_host(raw, &name.to_string_lossy()),
        Err(_) => raw.to_string(),
    }
}

fn replace_loopback_host(raw: &str, host: &str) -> String {
    let (scheme, rest) = match raw.find("://") {
        Some(pos) => raw.split_at(pos + 3),
        None => ("", raw),
    };
    let end = rest.find([':', '/', '?']).unwrap_or(rest.len());
    match &rest[..end] {
        "127.0.0.1" | "localhost" => format!("{}{}{}", scheme, host, &rest[end..]),
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_host_replaced() {
        assert_eq!(
            replace_loopback_host("http://127.0.0.1:8787/status", "node7"),
            "http://node7:8787/status"
        );
        assert_eq!(
            replace_loopback_host("http://localhost/status", "node7"),
            "http://node7/status"
        );
    }

    #[test]
    fn test_other_hosts_untouched() {
        assert_eq!(
            replace_loopback_host("https://scheduler.example.org:8787/", "node7"),
            "https://scheduler.example.org:8787/"
        );
        assert_eq!(
            replace_loopback_host("http://127.0.0.10:1/", "node7"),
            "http://127.0.0.10:1/"
        );
    }

    #[test]
    fn test_public_link_keeps_path() {
        let link = public_dashboard_link("http://127.0.0.1:8787/status");
        assert!(link.ends_with(":8787/status"));
        assert!(link.starts_with("http://"));
    }
}
