//! Resolution through the DNS client.
//!
//! Chromium mapping: `HostResolverImpl::DnsTask`

use super::cache::HostCacheKey;
use super::client::DnsClient;
use super::message::{Event, JobId};
use super::proc_task::TaskEnv;
use tokio::task::AbortHandle;

/// One outstanding DNS client lookup. Dropping it abandons the lookup.
#[derive(Debug)]
pub(crate) struct DnsTask {
    lookup: AbortHandle,
}

impl DnsTask {
    pub(crate) fn start(
        client: &dyn DnsClient,
        key: &HostCacheKey,
        job: JobId,
        env: &TaskEnv,
    ) -> Self {
        tracing::debug!(host = %key.hostname, "starting DNS client lookup");
        let lookup = client.resolve(&key.hostname, key.address_family);
        let events = env.events.clone();
        let handle = env.runtime.spawn(async move {
            let result = lookup.await;
            let _ = events.send(Event::DnsTaskComplete { job, result });
        });
        Self {
            lookup: handle.abort_handle(),
        }
    }
}

impl Drop for DnsTask {
    fn drop(&mut self) {
        self.lookup.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::address::{AddressFamily, HostResolverFlags};
    use crate::base::neterror::NetError;
    use crate::dns::config::DnsConfig;
    use crate::dns::mock::{MockDnsClient, MockDnsResult};
    use crate::dns::message::EventSender;
    use crate::dns::worker::TokioWorkerPool;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::sync::mpsc;

    fn env(events: EventSender) -> TaskEnv {
        TaskEnv {
            events,
            worker_pool: Arc::new(TokioWorkerPool::new()),
            runtime: Handle::current(),
        }
    }

    fn key(host: &str) -> HostCacheKey {
        HostCacheKey::new(host, AddressFamily::Unspecified, HostResolverFlags::empty())
    }

    fn client() -> MockDnsClient {
        MockDnsClient::new(DnsConfig::new().nameserver("192.0.2.1:53".parse().unwrap()))
    }

    #[tokio::test]
    async fn test_reports_client_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _task = DnsTask::start(&client(), &key("nx_fail"), JobId(3), &env(tx));

        match rx.recv().await {
            Some(Event::DnsTaskComplete { job, result }) => {
                assert_eq!(job, JobId(3));
                assert_eq!(result, Err(NetError::NameNotResolved));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drop_abandons_lookup() {
        let client = client();
        client.add_rule("slow", MockDnsResult::Hang);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = DnsTask::start(&client, &key("slow"), JobId(1), &env(tx));
        drop(task);

        // The spawned lookup held the last sender; aborting it closes the channel.
        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(next, Ok(None)));
    }
}
