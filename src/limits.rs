/// Largest party accepted by the booking surface (the largest seeded table).
pub const MAX_GUESTS: u32 = 6;

pub const MAX_TABLES: usize = 500;
pub const MAX_TABLE_SEATS: u32 = 50;
pub const MAX_RESERVATIONS_PER_DAY: usize = 10_000;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 254;

/// Longest request line accepted by the wire protocol.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Session lifetime from issuance.
pub const SESSION_TTL_MS: i64 = 5 * 60 * 1000;
