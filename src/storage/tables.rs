use redb::TableDefinition;

/// Accounts: identity digest -> Account (bincode)
pub const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// Grant requests: request id -> GrantRequest (bincode)
pub const REQUESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("requests");
