//! System-wide constants for the SlotPay engine.

/// Decimal places of the USDT token's smallest chain unit.
pub const USDT_CHAIN_DECIMALS: u32 = 6;

/// Events fetched from the account feed per deposit scan.
pub const DEFAULT_DEPOSIT_SCAN_LIMIT: usize = 50;

/// Deposit scan interval in seconds.
pub const DEFAULT_DEPOSIT_INTERVAL_SECS: u64 = 60;

/// Withdrawal settle interval in seconds.
pub const DEFAULT_WITHDRAWAL_INTERVAL_SECS: u64 = 120;

/// Maximum withdrawal requests processed per settler tick.
pub const DEFAULT_WITHDRAWAL_BATCH_SIZE: usize = 10;

/// Delivery verification interval in seconds.
pub const DEFAULT_VERIFY_INTERVAL_SECS: u64 = 3_600;

/// Scheduling tolerance subtracted from the paid duration so a tick that
/// fires slightly early still picks the order up.
pub const VERIFY_TOLERANCE_SECS: i64 = 60;

/// Default paid display duration when the ad format specifies none.
pub const DEFAULT_DURATION_HOURS: u32 = 24;

/// Platform caption limit for media posts.
pub const MEDIA_CAPTION_LIMIT: usize = 1_024;

/// Where the platform truncates long captions before appending an ellipsis.
pub const MEDIA_CAPTION_TRUNCATE_AT: usize = 1_000;

/// Hashtag appended to every published ad post.
pub const AD_HASHTAG: &str = "#ad";

/// Attempts to locate the outbound transaction hash after a send.
pub const TX_HASH_POLL_ATTEMPTS: u32 = 3;

/// Delay between hash-lookup attempts in seconds.
pub const TX_HASH_POLL_DELAY_SECS: u64 = 6;

/// Attempts to resolve finality of a located transaction.
pub const FINALITY_POLL_ATTEMPTS: u32 = 3;

/// Delay between finality checks in seconds.
pub const FINALITY_POLL_DELAY_SECS: u64 = 5;

/// Length of the opaque post capability token.
pub const POST_TOKEN_LEN: usize = 16;

/// Default public chain indexer base URL.
pub const DEFAULT_TONAPI_BASE: &str = "https://tonapi.io";

/// Default block-explorer base URL for user-facing transaction links.
pub const DEFAULT_EXPLORER_BASE: &str = "https://tonscan.org";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "SlotPay";
