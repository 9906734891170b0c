use larder_core::AggregateId;

/// A command targets a specific aggregate stream.
///
/// Commands represent **intent**, a request to perform an action on one
/// lot or catalog item. They are transient (never persisted) and are
/// transformed into events, which are.
///
/// `target_aggregate_id()` pins the stream a command executes against: one
/// command, one aggregate, one transaction boundary. This is what lets
/// unrelated lots proceed in parallel while mutations on a single lot
/// serialize.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
