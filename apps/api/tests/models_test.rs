//! Schema/model agreement tests
//!
//! Fetches freshly seeded rows through the typed models so a drifting
//! migration (renamed column, changed type) fails here rather than in
//! production queries.
//!
//! # Requirements
//!
//! A PostgreSQL database with pgvector, reachable through
//! `DATABASE_URL`. Tests skip automatically when unavailable.

mod common;

use common::{cleanup_songs, embedding_with_similarity, try_create_test_pool, SongSeed, EMBEDDING_DIMENSION};
use setlist_api::models::{AudioOutput, Interaction, InteractionAction, Song};
use setlist_api::services::FeedbackService;

#[tokio::test]
async fn test_song_and_output_round_trip() {
    let Some(pool) = try_create_test_pool().await else {
        eprintln!("Skipping: test database not available");
        return;
    };
    let (song_id, output_id) = SongSeed::new("model check", embedding_with_similarity(0.9))
        .genre("model-genre")
        .bpm(128)
        .insert(&pool)
        .await;

    let song: Song = sqlx::query_as("SELECT * FROM songs WHERE id = $1")
        .bind(song_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(song.title, "model check");
    assert_eq!(song.primary_genre.as_deref(), Some("model-genre"));
    assert_eq!(song.bpm, Some(128));
    assert_eq!(
        song.embedding.as_ref().map(|e| e.as_slice().len()),
        Some(EMBEDDING_DIMENSION)
    );

    let output: AudioOutput = sqlx::query_as("SELECT * FROM audio_outputs WHERE id = $1")
        .bind(output_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(output.song_id, song_id);
    assert_eq!(output.output_number, 1);
    assert!(output.audio_url.starts_with("https://"));

    cleanup_songs(&pool, &[song_id]).await;
}

#[tokio::test]
async fn test_interaction_round_trip_and_cascade() {
    let Some(pool) = try_create_test_pool().await else {
        eprintln!("Skipping: test database not available");
        return;
    };
    let (song_id, output_id) = SongSeed::new("cascade check", embedding_with_similarity(0.9))
        .insert(&pool)
        .await;

    let feedback = FeedbackService::new(pool.clone());
    let recorded = feedback
        .record_interaction(
            output_id,
            InteractionAction::Like,
            0,
            Some("session-models"),
            Some(serde_json::json!({"surface": "test"})),
        )
        .await
        .unwrap();

    let interaction: Interaction = sqlx::query_as("SELECT * FROM interactions WHERE id = $1")
        .bind(recorded.interaction_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(interaction.output_id, output_id);
    assert_eq!(interaction.action_type, "like");
    assert_eq!(interaction.position_shown, 0);
    assert_eq!(interaction.session_id.as_deref(), Some("session-models"));

    // Deleting the song cascades to outputs, statistics and the log
    cleanup_songs(&pool, &[song_id]).await;
    let (remaining,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM interactions WHERE output_id = $1")
            .bind(output_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(remaining, 0);
    assert!(feedback.get_output_stats(output_id).await.unwrap().is_none());
}
