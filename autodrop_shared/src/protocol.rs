// Hooks the device transport calls for every protocol line it sends or receives.

pub trait ProtocolHooks: Send + Sync {
    /// Rewrite an outgoing line. Returns the lines to send in its place.
    fn outbound(&self, line: &str) -> Vec<String>;

    /// Observe an incoming line. The returned line continues down the normal path.
    fn inbound(&self, line: &str) -> String;
}
