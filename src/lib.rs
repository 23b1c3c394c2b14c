pub mod core;
pub mod structures;
pub mod schema;
pub mod column;
pub mod storage;
pub mod table;
pub mod query;
pub mod correctors;
pub mod security;
pub mod auth;
pub mod service;

/*
┌──────────────────────────────────────────────────────────────────────────────┐
│                            ARRIBA STRUCT ARCHITECTURE                         │
└──────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── SERVICE LAYER ───────────────────────────────┐
│  ┌──────────────────────────────┐  ┌──────────────────────────────┐          │
│  │ struct ManagementService     │  │ struct QueryService          │          │
│  │ • create/delete table        │  │ • select / distinct          │          │
│  │ • add columns, rows          │  │ • aggregate / all_count      │          │
│  │ • grant / revoke access      │  │ • query<Q: Query>            │          │
│  └──────────────┬───────────────┘  └──────────────┬───────────────┘          │
│                 └─────────┬───────────────────────┘                          │
│                           v                                                  │
│  ┌──────────────────────────────┐  ┌──────────────────────────────┐          │
│  │ struct Authorizer            │  │ struct ComposedCorrector     │          │
│  │ • mode: Enforced | GrantAll  │  │ • Me -> UserAlias -> Today   │          │
│  │ • claims: group cache (TTL)  │  └──────────────────────────────┘          │
│  └──────────────────────────────┘                                            │
└──────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── TABLE LAYER ─────────────────────────────────┐
│  SecureDatabase ──derefs──> Database ──owns──> Table ──owns──> Partition     │
│       │                        │                 │                │          │
│       └── ACL per table        └── FileLock      └── bit_count    └── Column │
│                                                     PartitionMask            │
│                                                                              │
│  Table::query<Q> ──par_iter──> Partition::compute ──> Q::merge ──> Output    │
└──────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────── STORAGE LAYER ────────────────────────────────┐
│  StorageLayout: <root>/tables/<Table>/{table.meta, p<mask>.part}             │
│                 <root>/security/{_database.json, <Table>.json}               │
│  PartitionFile: bincode header (crc32, length) + lz4 bincode payload        │
└──────────────────────────────────────────────────────────────────────────────┘
*/
