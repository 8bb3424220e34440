//! User/song library use cases on top of the view context.
//!
//! # Responsibility
//! - Provide the CRUD and bulk-delete entry points callers use.
//! - Hide contexts, requests and merge plumbing from front ends.
//!
//! # Invariants
//! - Writes go through the view context and are saved before returning.
//! - Bulk-delete completions run exactly once, on the view context's thread.
//! - Read failures are logged and reported as empty/absent.

use crate::config::StoreConfig;
use crate::context::{
    BatchDeleteResult, Context, PersistenceError, PersistenceResult, SubscriptionId,
};
use crate::controller::PersistenceController;
use crate::model::{now_epoch_ms, Attribute, Entity, EntityKind, NewSong, ObjectId, Song, User};
use crate::query::{BatchDeleteRequest, FetchRequest};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// Title of a song created by [`LibraryService::add_song`].
pub const NEW_SONG_TITLE: &str = "New Song";
/// Duration in seconds of a song created by [`LibraryService::add_song`].
pub const NEW_SONG_DURATION_SECS: f64 = 180.0;
/// Username the demo front ends operate on.
pub const DEFAULT_USERNAME: &str = "MusicLover123";
pub const PREVIEW_SONG_TITLE: &str = "Sample Song";

pub struct LibraryService {
    controller: PersistenceController,
}

impl LibraryService {
    pub fn new(controller: PersistenceController) -> Self {
        Self { controller }
    }

    pub fn open(config: &StoreConfig) -> PersistenceResult<Self> {
        PersistenceController::open(config).map(Self::new)
    }

    pub fn open_in_memory() -> PersistenceResult<Self> {
        PersistenceController::open_in_memory().map(Self::new)
    }

    pub fn controller(&self) -> &PersistenceController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PersistenceController {
        &mut self.controller
    }

    fn view(&mut self) -> &mut Context {
        self.controller.view_context_mut()
    }

    /// Creates and saves a user with the default age and a fresh unique id.
    pub fn create_user(&mut self, username: &str) -> PersistenceResult<User> {
        let user = User::new(username);
        let view = self.view();
        view.insert(user.clone())?;
        save_or_rollback(view)?;
        info!(
            "event=user_create module=service status=ok object={}",
            user.object_id
        );
        Ok(user)
    }

    /// Creates and saves a song owned by `owner`.
    pub fn create_song(&mut self, new_song: NewSong, owner: ObjectId) -> PersistenceResult<Song> {
        if owner.kind() != EntityKind::User {
            return Err(PersistenceError::WrongEntity {
                expected: EntityKind::User,
                found: owner.kind(),
            });
        }
        let song = Song::new(new_song, owner);
        let view = self.view();
        view.insert(song.clone())?;
        save_or_rollback(view)?;
        info!(
            "event=song_create module=service status=ok object={} owner={}",
            song.object_id, owner
        );
        Ok(song)
    }

    /// First user named `username`, or `None`.
    pub fn fetch_user(&mut self, username: &str) -> Option<User> {
        let request = FetchRequest::user_named(username).limit(1);
        match self.view().fetch(&request) {
            Ok(users) => users.into_iter().next().and_then(Entity::into_user),
            Err(err) => {
                error!(
                    "event=user_fetch module=service status=error error={}",
                    err
                );
                None
            }
        }
    }

    pub fn fetch_or_create_user(&mut self, username: &str) -> PersistenceResult<User> {
        match self.fetch_user(username) {
            Some(user) => Ok(user),
            None => self.create_user(username),
        }
    }

    /// Adds a "New Song" (180 s, recorded now) for `username`, creating the
    /// user when missing.
    pub fn add_song(&mut self, username: &str) -> PersistenceResult<Song> {
        let user = self.fetch_or_create_user(username)?;
        self.create_song(
            NewSong::new(NEW_SONG_TITLE, now_epoch_ms(), NEW_SONG_DURATION_SECS),
            user.object_id,
        )
    }

    /// Songs of `username`, most recently recorded first.
    pub fn songs_for_user(&mut self, username: &str) -> Vec<Song> {
        match self.view().fetch(&FetchRequest::songs_for_username(username)) {
            Ok(songs) => songs.into_iter().filter_map(Entity::into_song).collect(),
            Err(err) => {
                error!(
                    "event=song_fetch module=service status=error error={}",
                    err
                );
                Vec::new()
            }
        }
    }

    /// Live view of `songs_for_user`; `listener` gets the initial list and
    /// every change made in the view context or merged into it.
    pub fn subscribe_songs_for_user<F>(
        &mut self,
        username: &str,
        mut listener: F,
    ) -> PersistenceResult<SubscriptionId>
    where
        F: FnMut(&[Song]) + Send + 'static,
    {
        self.view().subscribe(
            FetchRequest::songs_for_username(username),
            Some(Box::new(move |entities: &[Entity]| {
                let songs: Vec<Song> = entities
                    .iter()
                    .filter_map(Entity::as_song)
                    .cloned()
                    .collect();
                listener(&songs);
            })),
        )
    }

    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        self.view().unsubscribe(subscription)
    }

    pub fn update_song_title(&mut self, song: ObjectId, title: &str) -> PersistenceResult<()> {
        let view = self.view();
        view.set(song, Attribute::Title, title)?;
        save_or_rollback(view)
    }

    pub fn delete_song(&mut self, song: ObjectId) -> PersistenceResult<()> {
        self.delete_songs(&[song]).map(|_| ())
    }

    /// Deletes several songs with a single save. Returns how many were deleted.
    pub fn delete_songs(&mut self, songs: &[ObjectId]) -> PersistenceResult<usize> {
        let view = self.view();
        for song in songs {
            if song.kind() != EntityKind::Song {
                view.rollback()?;
                return Err(PersistenceError::WrongEntity {
                    expected: EntityKind::Song,
                    found: song.kind(),
                });
            }
            if let Err(err) = view.delete(*song) {
                view.rollback()?;
                return Err(err);
            }
        }
        save_or_rollback(view)?;
        Ok(songs.len())
    }

    /// Deletes a user and every song they own.
    pub fn delete_user(&mut self, user: ObjectId) -> PersistenceResult<()> {
        if user.kind() != EntityKind::User {
            return Err(PersistenceError::WrongEntity {
                expected: EntityKind::User,
                found: user.kind(),
            });
        }
        let view = self.view();
        view.delete(user)?;
        save_or_rollback(view)
    }

    /// Batch-deletes all songs, then all users, on the view context.
    ///
    /// Both deletes commit together or not at all. The deletion is merged into
    /// the view context and published to every other context before
    /// `completion` runs. `completion` runs exactly once, also when the delete
    /// fails.
    pub fn delete_all_songs_and_users<F>(&mut self, completion: F) -> PersistenceResult<usize>
    where
        F: FnOnce(),
    {
        let view = self.view();
        let result = view.execute_batch_deletes(&[
            BatchDeleteRequest::all(EntityKind::Song),
            BatchDeleteRequest::all(EntityKind::User),
        ]);
        let outcome = match result {
            Ok(result) => {
                let deleted = result.deleted.len();
                log_bulk_delete("foreground", &result);
                view.merge_batch_delete(result);
                Ok(deleted)
            }
            Err(err) => {
                error!(
                    "event=bulk_delete module=service status=error mode=foreground error={}",
                    err
                );
                Err(err)
            }
        };
        completion();
        outcome
    }

    /// Batch-deletes all songs on a background context.
    ///
    /// The deletion event is published to the view context first, then
    /// `completion` is queued behind it, so it runs on the view context's
    /// thread (during `process_pending`/`wait_for_pending`) after the merge.
    /// Failures are logged; `completion` still runs exactly once.
    pub fn delete_all_songs_using_background<F>(&self, completion: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let completion = Arc::new(Mutex::new(Some(completion)));
        let task_completion = Arc::clone(&completion);
        let main_queue = self.controller.main_queue();

        let started = self.controller.perform_background_task(move |context| {
            match context.execute_batch_delete(&BatchDeleteRequest::all(EntityKind::Song)) {
                Ok(result) => {
                    log_bulk_delete("background", &result);
                    context.merge_batch_delete(result);
                }
                Err(err) => error!(
                    "event=bulk_delete module=service status=error mode=background error={}",
                    err
                ),
            }
            let queued = main_queue.perform(move |_view| {
                let completion = task_completion.lock().take();
                if let Some(completion) = completion {
                    completion();
                }
            });
            if !queued {
                warn!(
                    "event=bulk_delete module=service status=skipped mode=background reason=view_context_closed"
                );
            }
        });

        if !started {
            let completion = completion.lock().take();
            if let Some(completion) = completion {
                completion();
            }
        }
    }

    /// Sample user plus a favorite "Sample Song", for previews and demos.
    pub fn seed_preview_data(&mut self) -> PersistenceResult<(User, Song)> {
        let user = self.fetch_or_create_user(DEFAULT_USERNAME)?;
        let song = self.create_song(
            NewSong::new(PREVIEW_SONG_TITLE, now_epoch_ms(), NEW_SONG_DURATION_SECS)
                .favorite(true),
            user.object_id,
        )?;
        Ok((user, song))
    }
}

fn save_or_rollback(view: &mut Context) -> PersistenceResult<()> {
    if let Err(err) = view.save() {
        if let Err(rollback_err) = view.rollback() {
            warn!(
                "event=context_rollback module=service status=error error={}",
                rollback_err
            );
        }
        return Err(err);
    }
    Ok(())
}

fn log_bulk_delete(mode: &str, result: &BatchDeleteResult) {
    info!(
        "event=bulk_delete module=service status=ok mode={} songs={} users={} sequence={}",
        mode,
        result.count_of(EntityKind::Song),
        result.count_of(EntityKind::User),
        result.commit_sequence
    );
}
