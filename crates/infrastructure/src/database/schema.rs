// Database schema for the torrent gateway.
diesel::table! {
    users (id) {
        id -> Text,
        username -> Text,           // Unique, case-sensitive
        password_hash -> Text,      // Argon2id PHC string
        is_admin -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    backends (id) {
        id -> Text,
        user_id -> Text,
        name -> Text,
        kind -> Text,               // "rtorrent" or "transmission"
        host -> Text,
        port -> Integer,
        rpc_path -> Nullable<Text>, // e.g. "/RPC2"
        use_ssl -> Bool,
        username -> Nullable<Text>,
        password -> Nullable<Text>,
        enabled -> Bool,
        is_default -> Bool,         // At most one per user
        version -> BigInt,          // Bumped on update, keys the client cache
        last_used_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
        http_host -> Nullable<Text>,
        http_port -> Nullable<Integer>,
        http_path -> Nullable<Text>,
        http_username -> Nullable<Text>,
        http_password -> Nullable<Text>,
        http_use_ssl -> Bool,
        mount_path -> Nullable<Text>,
        download_dir -> Nullable<Text>,
        auto_download_enabled -> Bool,
        auto_download_path -> Nullable<Text>,
        delete_remote_after -> Bool,
        ssh_host -> Nullable<Text>,
        ssh_port -> Nullable<Integer>,
        ssh_user -> Nullable<Text>,
        ssh_key_path -> Nullable<Text>,
    }
}

diesel::table! {
    torrents (id) {
        id -> Integer,
        info_hash -> Text,          // Uppercase 40-hex
        user_id -> Text,
        backend_id -> Text,
        name -> Text,
        size -> BigInt,
        is_private -> Bool,
        base_path -> Nullable<Text>,
        labels -> Text,             // Comma-joined
        added_at -> Timestamp,
    }
}

diesel::table! {
    statuses (id) {
        id -> Integer,
        torrent_hash -> Text,
        backend_id -> Nullable<Text>,
        is_seeding -> Bool,
        is_private -> Bool,
        progress -> Double,         // 0.0 to 1.0
        down_rate -> BigInt,
        up_rate -> BigInt,
        peers -> Integer,
        seeds -> Integer,
        timestamp -> Timestamp,
    }
}

diesel::table! {
    actions (id) {
        id -> Integer,
        torrent_hash -> Text,
        backend_id -> Nullable<Text>,
        kind -> Text,               // add, start, stop, remove, transfer_*, error
        detail -> Nullable<Text>,
        timestamp -> Timestamp,
    }
}

diesel::table! {
    transfer_jobs (id) {
        id -> Text,
        user_id -> Text,
        torrent_hash -> Text,
        backend_id -> Text,
        source_path -> Text,
        dest_path -> Text,
        state -> Text,              // pending, running, done, failed
        bytes_done -> BigInt,
        bytes_total -> BigInt,
        error -> Nullable<Text>,
        started_at -> Timestamp,
        finished_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    torrent_settings (id) {
        id -> Integer,
        user_id -> Text,
        torrent_hash -> Text,
        key -> Text,
        value -> Text,
    }
}

diesel::table! {
    sessions (id) {
        id -> Text,                 // 64-char opaque token
        user_id -> Text,
        created_at -> Timestamp,
        last_activity -> Timestamp,
        expires_at -> Timestamp,
        ip -> Nullable<Text>,
        user_agent -> Nullable<Text>,
    }
}

diesel::table! {
    remember_tokens (id) {
        id -> Text,                 // 64-char opaque token
        user_id -> Text,
        created_at -> Timestamp,
        expires_at -> Timestamp,
        ip -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        revoked -> Bool,
    }
}

diesel::table! {
    api_keys (id) {
        id -> Text,                 // The full key value
        prefix -> Text,             // First 8 chars, exposed in listings
        user_id -> Text,
        name -> Text,
        created_at -> Timestamp,
        last_used_at -> Nullable<Timestamp>,
        expires_at -> Nullable<Timestamp>,
        revoked -> Bool,
    }
}

diesel::table! {
    webhooks (id) {
        id -> Text,
        user_id -> Text,
        url -> Text,
        events -> Text,             // Comma-joined event filter, empty = all
        created_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    users,
    backends,
    torrents,
    statuses,
    actions,
    transfer_jobs,
    torrent_settings,
    sessions,
    remember_tokens,
    api_keys,
    webhooks,
);
