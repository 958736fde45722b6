//! Cross-entity commits in a single transaction

use super::history::{bind_history, HISTORY_INSERT};
use super::movie_file::{bind_file_insert, FILE_INSERT};
use super::queue::{bind_queue_item, queue_item_from_row, QUEUE_UPSERT};
use super::wanted::{bind_wanted, WANTED_UPSERT};
use super::{enum_to_text, to_json, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::{GrabCommit, ImportCommit, TransactionalStore};
use reelvault_core::error::Result;
use reelvault_core::models::QueueItem;

const QUEUE_UPSERT_RETURNING: &str =
    "INSERT INTO queue_items (id, movie_id, release_id, title, download_client_id,
         download_id, protocol, size_bytes, size_left, status, status_messages,
         output_path, import_attempts, added_at, updated_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
     ON CONFLICT (download_client_id, download_id) DO UPDATE SET
         release_id = EXCLUDED.release_id,
         size_bytes = EXCLUDED.size_bytes,
         updated_at = EXCLUDED.updated_at
     RETURNING id, movie_id, release_id, title, download_client_id, download_id,
         protocol, size_bytes, size_left, status, status_messages, output_path,
         import_attempts, added_at, updated_at";

#[async_trait]
impl TransactionalStore for PostgresStore {
    /// Release flips to grabbed, the queue row lands idempotently keyed on
    /// `(download_client_id, download_id)`, and history is appended — all
    /// or nothing.
    async fn commit_grab(&self, commit: GrabCommit) -> Result<QueueItem> {
        let mut tx = self.pool().begin().await?;

        let release = &commit.release;
        sqlx::query(
            "UPDATE releases SET status = $2, grabbed_at = $3, download_client_id = $4,
                 movie_id = $5, rejection_reasons = $6
             WHERE id = $1",
        )
        .bind(release.id)
        .bind(enum_to_text(&release.status))
        .bind(release.grabbed_at)
        .bind(release.download_client_id)
        .bind(release.movie_id)
        .bind(to_json(&release.rejection_reasons)?)
        .execute(&mut *tx)
        .await?;

        let row = bind_queue_item(QUEUE_UPSERT_RETURNING, &commit.queue_item)?
            .fetch_one(&mut *tx)
            .await?;
        let item = queue_item_from_row(&row)?;

        bind_history(HISTORY_INSERT, &commit.history)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(item)
    }

    /// Registration is the import's commit point: the previous file goes,
    /// the new one lands, the movie flips to has_file, the wanted row is
    /// resolved, history is appended and the queue item finalizes.
    async fn commit_import(&self, commit: ImportCommit) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        if let Some(old_id) = commit.delete_file_id {
            sqlx::query("DELETE FROM movie_files WHERE id = $1")
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
        }

        bind_file_insert(FILE_INSERT, &commit.new_file)?
            .execute(&mut *tx)
            .await?;

        let movie = &commit.movie;
        sqlx::query(
            "UPDATE movies SET has_file = $2, movie_file_id = $3, size_on_disk = $4,
                 path = $5, updated_at = $6
             WHERE id = $1",
        )
        .bind(movie.id)
        .bind(movie.has_file)
        .bind(movie.movie_file_id)
        .bind(movie.size_on_disk)
        .bind(&movie.path)
        .bind(movie.updated_at)
        .execute(&mut *tx)
        .await?;

        if commit.delete_wanted {
            sqlx::query("DELETE FROM wanted_movies WHERE movie_id = $1")
                .bind(movie.id)
                .execute(&mut *tx)
                .await?;
        } else if let Some(wanted) = &commit.wanted_update {
            bind_wanted(WANTED_UPSERT, wanted)?.execute(&mut *tx).await?;
        }

        bind_history(HISTORY_INSERT, &commit.history)
            .execute(&mut *tx)
            .await?;

        bind_queue_item(QUEUE_UPSERT, &commit.queue_item)?
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
