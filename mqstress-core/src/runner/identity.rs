/// Topic and client ids of one worker.
///
/// Ids combine the host, the worker id and a random nonce so that concurrent
/// workers and repeated runs against the same broker never share a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub topic: String,
    pub subscriber_id: String,
    pub publisher_id: String,
}

impl WorkerIdentity {
    #[must_use]
    pub fn derive(topic_base: &str, host: &str, worker_id: usize) -> Self {
        Self::with_nonce(topic_base, host, worker_id, rand::random::<u32>())
    }

    #[must_use]
    pub fn with_nonce(topic_base: &str, host: &str, worker_id: usize, nonce: u32) -> Self {
        let host = sanitize(host);
        let base = topic_base.trim_end_matches('/');

        Self {
            topic: format!("{base}/{host}/worker{worker_id}-{nonce}"),
            subscriber_id: format!("mqstress-sub-{host}-worker{worker_id}-{nonce}"),
            publisher_id: format!("mqstress-pub-{host}-worker{worker_id}-{nonce}"),
        }
    }
}

// Topic levels must not contain separators or wildcards.
fn sanitize(host: &str) -> String {
    host.chars()
        .map(|c| match c {
            '/' | '+' | '#' | ' ' => '-',
            c => c,
        })
        .collect()
}
