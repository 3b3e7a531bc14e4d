// -
// Tree layout

/// Per-host remote control subtree: `{root}/remotecontrol/{ip}`
pub const REMOTECONTROL: &str = "remotecontrol";
pub const INPUT: &str = "input";
pub const OUTPUT: &str = "output";

/// Topology mirror subtree: `{root}/instances/{group}/grp@{sub}/inst@{key}`
pub const INSTANCES: &str = "instances";
pub const GROUP_PREFIX: &str = "grp@";
pub const INSTANCE_PREFIX: &str = "inst@";

/// Payload of a top-level group container
pub const GROUP_BOOTSTRAP_MARKER: &str = "GRP";

/// CDC queues
pub const LIVENESS_QUEUE: &str = "queue";
pub const TOPOLOGY_QUEUE: &str = "jaqueue";
pub const QUEUE_ENTRY_PREFIX: &str = "q@";
/// First entry appended to each queue by a freshly started collector
pub const QUEUE_START_MARKER: &str = "1";

/// Path segment identifying liveness probe nodes
pub const LIVENESS_SEGMENT: &str = "pingstatus";

// -
// Remote command protocol

pub const COMMAND_PREFIX: &str = "cmd@";
/// Separates command text from its timeout in a request payload
pub const FIELD_SPLIT: char = '&';
/// Terminal result value
pub const EOF_SENTINEL: &str = "EOF";

/// Width of the zero-padded suffix the service appends to sequential nodes
pub const SEQUENCE_WIDTH: usize = 10;

// -
// Discovery script protocol

pub const DEFAULT_RESULT_PREFIX: &str = "JA_RESULT=";
pub const SCRIPT_ERROR_CODE: &str = "E";
pub const NO_DATABASE_CODES: [&str; 2] = ["Y", "R"];
/// Line count of discovery fields
pub const DISCOVERY_FIELD_COUNT: usize = 6;
/// Output of the HA status check that indicates a load balancer in front of keepalived
pub const HA_LVS_STATUS: &str = "10";
