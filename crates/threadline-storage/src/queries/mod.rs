// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod conversations;
pub mod mappings;
pub mod messages;
pub mod queue;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_support {
    use threadline_core::types::Conversation;

    use crate::database::Database;

    pub async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    pub async fn seed_conversation(db: &Database, user: &str) -> Conversation {
        let conversation = Conversation::new(user, "interactive");
        super::conversations::create_conversation(db, &conversation)
            .await
            .unwrap();
        conversation
    }
}
