use std::fmt;
use std::str::FromStr;

/// Outbound slots per client before the client counts as a slow consumer.
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;

/// Broadcast requests the coordinator buffers before new ones are dropped.
pub const DEFAULT_BROADCAST_QUEUE_CAPACITY: usize = 256;

/// How a connection's identity relates to the `user_id` of the envelopes it sends.
///
/// The hub cannot authenticate what a client claims, so the integrator picks:
/// `Reported` trusts the claim, `Bound` pins identity at admission time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdentityPolicy {
    /// Each inbound envelope's `user_id` becomes the connection's identity
    /// (last write wins) and is relayed unchanged. Any client can claim any user.
    #[default]
    Reported,
    /// The identity given at admission never changes; inbound `user_id`s are
    /// overwritten with it, or stripped for anonymous connections.
    Bound,
}

#[derive(Debug, PartialEq, Eq)]
pub struct IdentityPolicyParseError;

impl fmt::Display for IdentityPolicyParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "identity policy must be one of: reported, bound")
    }
}

impl std::error::Error for IdentityPolicyParseError {}

impl FromStr for IdentityPolicy {
    type Err = IdentityPolicyParseError;
    fn from_str(policy: &str) -> Result<IdentityPolicy, Self::Err> {
        match policy.to_lowercase().as_str() {
            "reported" => Ok(IdentityPolicy::Reported),
            "bound" => Ok(IdentityPolicy::Bound),
            _ => Err(IdentityPolicyParseError),
        }
    }
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IdentityPolicy::Reported => write!(f, "reported"),
            IdentityPolicy::Bound => write!(f, "bound"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub client_queue_capacity: usize,
    pub broadcast_queue_capacity: usize,
    pub identity_policy: IdentityPolicy,
    /// Deliver a client's own broadcasts back to it.
    pub echo_to_sender: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            broadcast_queue_capacity: DEFAULT_BROADCAST_QUEUE_CAPACITY,
            identity_policy: IdentityPolicy::default(),
            echo_to_sender: true,
        }
    }
}
