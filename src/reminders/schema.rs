diesel::table! {
    reminders (id) {
        id -> Integer,
        chat_id -> BigInt,
        task -> Text,
        context -> Nullable<Text>,
        fire_at -> BigInt,
        fired -> Bool,
        recurrence_kind -> Nullable<Text>,
        recurrence_interval -> Nullable<Integer>,
        recurrence_weekdays -> Nullable<Text>,
        recurrence_ends_at -> Nullable<BigInt>,
        last_fired_at -> Nullable<BigInt>,
        deleted -> Bool,
        deleted_at -> Nullable<BigInt>,
        deleted_by -> Nullable<Text>,
        version -> Integer,
        original_id -> Nullable<Integer>,
        is_current_version -> Bool,
        created_at -> BigInt,
    }
}
