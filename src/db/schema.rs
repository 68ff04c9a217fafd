pub const SCHEMA: &str = r#"
-- Listings table: property metadata plus denormalized rollup columns
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,
    price REAL,
    zip_code TEXT,
    city TEXT,
    state TEXT,

    -- Denormalized from property_aggregations for join-free reads
    dominant_room_types TEXT,      -- JSON array
    overall_condition_score REAL,
    room_counts TEXT,              -- JSON object {"kitchen": 3, ...}
    total_images INTEGER DEFAULT 0,

    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_listings_zip ON listings(zip_code);

-- Images table: one row per ingested photo, immutable after write
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER,
    filename TEXT NOT NULL,
    locator TEXT NOT NULL,         -- Opaque object-storage locator
    embedding BLOB,                -- Image embedding, float32 LE bytes
    text_embedding BLOB,           -- Text embedding for cross-modal search
    meta TEXT,                     -- JSON: model version, dimensions, format
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (listing_id) REFERENCES listings(id)
);

CREATE INDEX IF NOT EXISTS idx_images_listing ON images(listing_id);

-- Image labels: append-only inference output, never mutated.
-- A re-inference inserts a new row under a new model_version.
CREATE TABLE IF NOT EXISTS image_labels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    image_id INTEGER NOT NULL,

    room_type TEXT,
    room_confidence REAL,
    condition_score REAL,          -- 0..1
    natural_light_score REAL,      -- 0..1
    features TEXT,                 -- JSON array of feature tags

    localization TEXT,
    localization_confidence REAL,
    style TEXT,
    style_confidence REAL,

    work_recommendations TEXT,     -- JSON array, ordered
    cost_estimates TEXT,           -- JSON array, parallel to recommendations

    model_version TEXT,
    inference_timestamp TEXT,

    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_image_labels_image ON image_labels(image_id);
CREATE INDEX IF NOT EXISTS idx_image_labels_room ON image_labels(room_type);

-- Denormalized nearest-neighbor index, independent of owning entity schema
CREATE TABLE IF NOT EXISTS embeddings_index (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,            -- 'image' or 'text'
    vector BLOB NOT NULL,          -- float32 LE bytes
    vector_dim INTEGER NOT NULL,
    ref_id INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_index_kind ON embeddings_index(kind);
CREATE INDEX IF NOT EXISTS idx_embeddings_index_ref ON embeddings_index(ref_id);

-- Property aggregations: at most one live row per listing, replaced wholesale
CREATE TABLE IF NOT EXISTS property_aggregations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER NOT NULL UNIQUE,

    overall_condition_score REAL,
    avg_natural_light_score REAL,

    room_counts TEXT,              -- JSON object
    dominant_room_type TEXT,

    common_features TEXT,          -- JSON array, most common first

    dominant_style TEXT,
    style_distribution TEXT,       -- JSON object, values sum to 1.0

    primary_localization TEXT,
    localization_distribution TEXT,

    total_images INTEGER DEFAULT 0,
    last_calculated_at TEXT,
    calculation_version TEXT,

    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (listing_id) REFERENCES listings(id)
);

-- Temporal changes: append-only comparisons between two images of a listing
CREATE TABLE IF NOT EXISTS temporal_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id INTEGER NOT NULL,
    image_id INTEGER NOT NULL,

    change_type TEXT NOT NULL,     -- 'condition', 'natural_light', 'feature', 'style'
    change_magnitude REAL,
    change_direction TEXT,         -- 'improved', 'degraded', 'stable'

    previous_value REAL,
    current_value REAL,
    previous_image_id INTEGER,
    time_delta_days INTEGER,

    model_version TEXT,
    flagged_for_review INTEGER DEFAULT 0,
    detected_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,

    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (listing_id) REFERENCES listings(id),
    FOREIGN KEY (image_id) REFERENCES images(id)
);

CREATE INDEX IF NOT EXISTS idx_temporal_changes_listing ON temporal_changes(listing_id);
CREATE INDEX IF NOT EXISTS idx_temporal_changes_flagged ON temporal_changes(flagged_for_review);

-- Conversations group an ordered sequence of messages
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT,
    listing_id INTEGER,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (listing_id) REFERENCES listings(id)
);

CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);

-- Messages: append-only, ordered by creation time within a conversation
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL,
    role TEXT NOT NULL,            -- 'user' or 'assistant'
    text TEXT NOT NULL,
    embedding BLOB,                -- float32 LE bytes

    -- Per-call latency measurements
    embedding_latency_ms REAL,
    retrieval_latency_ms REAL,
    llm_latency_ms REAL,

    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
"#;
