// table definitions for the sqlite store

diesel::table! {
    tcc_tournaments (id) {
        id -> Text,
        user_id -> BigInt,
        name -> Text,
        slug -> Text,
        game_name -> Nullable<Text>,
        tournament_type -> Text,
        state -> Text,
        hold_third_place_match -> Bool,
        grand_finals_modifier -> Text,
        swiss_rounds -> Integer,
        ranked_by -> Text,
        sequential_pairings -> Bool,
        bye_strategy -> Text,
        signup_cap -> Nullable<Integer>,
        created_at -> Text,
        started_at -> Nullable<Text>,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    tcc_participants (id) {
        id -> Text,
        tournament_id -> Text,
        user_id -> BigInt,
        name -> Text,
        seed -> Integer,
        active -> Bool,
        checked_in -> Bool,
        misc -> Nullable<Text>,
        final_rank -> Nullable<Integer>,
        created_at -> Text,
    }
}

diesel::table! {
    tcc_matches (id) {
        id -> Text,
        tournament_id -> Text,
        user_id -> BigInt,
        identifier -> Text,
        round -> Integer,
        suggested_play_order -> Integer,
        bracket_position -> Integer,
        losers_bracket -> Bool,
        player1_id -> Nullable<Text>,
        player2_id -> Nullable<Text>,
        player1_prereq_match_id -> Nullable<Text>,
        player2_prereq_match_id -> Nullable<Text>,
        player1_is_prereq_loser -> Bool,
        player2_is_prereq_loser -> Bool,
        winner_id -> Nullable<Text>,
        loser_id -> Nullable<Text>,
        player1_score -> Integer,
        player2_score -> Integer,
        score_text -> Nullable<Text>,
        forfeited -> Bool,
        forfeited_participant_id -> Nullable<Text>,
        station_id -> Nullable<Text>,
        underway_at -> Nullable<Text>,
        completed_at -> Nullable<Text>,
        state -> Text,
        is_bye -> Bool,
    }
}

diesel::table! {
    tcc_stations (id) {
        id -> Text,
        tournament_id -> Text,
        user_id -> BigInt,
        name -> Text,
        current_match_id -> Nullable<Text>,
    }
}

diesel::table! {
    tcc_waitlist (id) {
        id -> Text,
        tournament_id -> Text,
        user_id -> BigInt,
        name -> Text,
        email -> Nullable<Text>,
        position -> Integer,
        status -> Text,
        created_at -> Text,
        promoted_at -> Nullable<Text>,
    }
}

diesel::table! {
    tcc_match_history (id) {
        id -> Text,
        tournament_id -> Text,
        user_id -> BigInt,
        match_id -> Text,
        action -> Text,
        prior_state -> Text,
        prior_winner_id -> Nullable<Text>,
        prior_loser_id -> Nullable<Text>,
        prior_player1_score -> Integer,
        prior_player2_score -> Integer,
        actor -> Nullable<Text>,
        undone -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    tcc_deployments (user_id) {
        user_id -> BigInt,
        tournament_id -> Nullable<Text>,
        deployed_at -> Text,
    }
}
