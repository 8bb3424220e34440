use songvault_core::service::{NEW_SONG_DURATION_SECS, NEW_SONG_TITLE, PREVIEW_SONG_TITLE};
use songvault_core::{
    EntityKind, FetchRequest, LibraryService, NewSong, ObjectId, PersistenceError, Song,
    DEFAULT_USER_AGE,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const USERNAME: &str = "MusicLover123";

fn service() -> LibraryService {
    LibraryService::open_in_memory().unwrap()
}

#[test]
fn create_user_then_fetch_returns_same_unique_id() {
    let mut service = service();
    let created = service.create_user("alice").unwrap();
    assert_eq!(created.age, DEFAULT_USER_AGE);

    let fetched = service.fetch_user("alice").unwrap();
    assert_eq!(fetched.unique_id, created.unique_id);
    assert!(service.fetch_user("nobody").is_none());

    let again = service.fetch_or_create_user("alice").unwrap();
    assert_eq!(again.object_id, created.object_id);
}

#[test]
fn add_song_then_bulk_delete_scenario() {
    let mut service = service();
    let song = service.add_song(USERNAME).unwrap();
    assert_eq!(song.title, NEW_SONG_TITLE);
    assert_eq!(song.duration, NEW_SONG_DURATION_SECS);
    assert!(!song.is_favorite);

    let user = service.fetch_user(USERNAME).unwrap();
    assert_eq!(user.age, 18);
    assert_eq!(song.owner, user.object_id);
    assert_eq!(service.songs_for_user(USERNAME), vec![song]);

    let mut completions = 0;
    let deleted = service
        .delete_all_songs_and_users(|| completions += 1)
        .unwrap();
    assert_eq!(completions, 1);
    assert_eq!(deleted, 2);
    assert!(service.songs_for_user(USERNAME).is_empty());
    assert!(service.fetch_user(USERNAME).is_none());
}

#[test]
fn songs_are_listed_newest_first() {
    let mut service = service();
    let user = service.create_user("alice").unwrap();
    for (title, date) in [("old", 10), ("newest", 30), ("middle", 20)] {
        service
            .create_song(NewSong::new(title, date, 60.0), user.object_id)
            .unwrap();
    }

    let titles: Vec<String> = service
        .songs_for_user("alice")
        .into_iter()
        .map(|song| song.title)
        .collect();
    assert_eq!(titles, vec!["newest", "middle", "old"]);
}

#[test]
fn create_song_requires_a_user_owner() {
    let mut service = service();
    let user = service.create_user("alice").unwrap();
    let song = service
        .create_song(NewSong::new("a", 1, 1.0), user.object_id)
        .unwrap();

    let err = service
        .create_song(NewSong::new("b", 1, 1.0), song.object_id)
        .unwrap_err();
    assert!(matches!(err, PersistenceError::WrongEntity { .. }));

    let missing = ObjectId::new(EntityKind::User);
    let err = service
        .create_song(NewSong::new("c", 1, 1.0), missing)
        .unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound(id) if id == missing));
}

#[test]
fn batch_delete_of_many_songs_clears_view_cache() {
    let mut service = service();
    let songs: Vec<Song> = (0..10).map(|_| service.add_song(USERNAME).unwrap()).collect();
    let before = service.controller().store().commit_sequence();

    assert_eq!(service.delete_all_songs_and_users(|| {}).unwrap(), 11);
    assert_eq!(service.controller().store().commit_sequence(), before + 1);

    assert!(service.songs_for_user(USERNAME).is_empty());
    let view = service.controller().view_context();
    for song in &songs {
        assert!(!view.is_registered(song.object_id));
    }
    assert_eq!(view.registered_objects(), 0);
}

#[test]
fn background_delete_completes_after_merge_is_visible() {
    let mut service = service();
    for _ in 0..3 {
        service.add_song(USERNAME).unwrap();
    }

    let events = Arc::new(Mutex::new(Vec::new()));
    let listener_events = Arc::clone(&events);
    service
        .subscribe_songs_for_user(USERNAME, move |songs| {
            listener_events
                .lock()
                .unwrap()
                .push(format!("songs={}", songs.len()));
        })
        .unwrap();

    let completion_events = Arc::clone(&events);
    service.delete_all_songs_using_background(move || {
        completion_events.lock().unwrap().push("done".to_string());
    });
    service.controller().wait_for_background_tasks();
    assert_eq!(*events.lock().unwrap(), vec!["songs=3"]);

    assert_eq!(service.controller_mut().process_main_queue(), 2);
    assert_eq!(*events.lock().unwrap(), vec!["songs=3", "songs=0", "done"]);
    assert!(service.songs_for_user(USERNAME).is_empty());
    assert!(service.fetch_user(USERNAME).is_some());
}

#[test]
fn background_delete_fires_completion_exactly_once() {
    let service = service();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    service.delete_all_songs_using_background(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    service.controller().wait_for_background_tasks();

    let mut service = service;
    service.controller_mut().process_main_queue();
    service.controller_mut().process_main_queue();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn interleaved_foreground_writes_and_background_delete_converge() {
    let mut service = service();
    let old: Vec<Song> = (0..3).map(|_| service.add_song(USERNAME).unwrap()).collect();

    service.delete_all_songs_using_background(|| {});
    service.controller().wait_for_background_tasks();

    let fresh: Vec<Song> = (0..2).map(|_| service.add_song(USERNAME).unwrap()).collect();
    // The row is already gone in the store; the update is dropped.
    service
        .update_song_title(old[0].object_id, "Too late")
        .unwrap();

    service.controller_mut().process_main_queue();

    let listed = service.songs_for_user(USERNAME);
    let listed_ids: BTreeSet<ObjectId> = listed.iter().map(|song| song.object_id).collect();
    let fresh_ids: BTreeSet<ObjectId> = fresh.iter().map(|song| song.object_id).collect();
    assert_eq!(listed.len(), listed_ids.len());
    assert_eq!(listed_ids, fresh_ids);
    assert_eq!(service.controller().view_context().registered_objects(), 3);

    let mut other = service.controller().new_background_context();
    let stored: BTreeSet<ObjectId> = other
        .fetch(&FetchRequest::new(EntityKind::Song))
        .unwrap()
        .iter()
        .map(|entity| entity.object_id())
        .collect();
    assert_eq!(stored, fresh_ids);
}

#[test]
fn delete_user_cascades_and_leaves_other_users_alone() {
    let mut service = service();
    let alice = service.create_user("alice").unwrap();
    let bob = service.create_user("bob").unwrap();
    for index in 0..2 {
        service
            .create_song(NewSong::new(format!("a{index}"), index, 1.0), alice.object_id)
            .unwrap();
    }
    service
        .create_song(NewSong::new("b", 1, 1.0), bob.object_id)
        .unwrap();

    service.delete_user(alice.object_id).unwrap();

    assert!(service.fetch_user("alice").is_none());
    assert!(service.songs_for_user("alice").is_empty());
    assert_eq!(service.songs_for_user("bob").len(), 1);
    let mut other = service.controller().new_background_context();
    assert_eq!(other.count(&FetchRequest::new(EntityKind::Song)).unwrap(), 1);
}

#[test]
fn rename_and_delete_single_songs() {
    let mut service = service();
    let first = service.add_song(USERNAME).unwrap();
    let second = service.add_song(USERNAME).unwrap();
    let third = service.add_song(USERNAME).unwrap();

    service
        .update_song_title(first.object_id, "Renamed")
        .unwrap();
    service.delete_song(second.object_id).unwrap();
    assert_eq!(
        service
            .delete_songs(&[third.object_id])
            .unwrap(),
        1
    );

    let remaining = service.songs_for_user(USERNAME);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].title, "Renamed");

    let err = service.delete_songs(&[first.owner]).unwrap_err();
    assert!(matches!(err, PersistenceError::WrongEntity { .. }));
    assert_eq!(service.songs_for_user(USERNAME).len(), 1);
}

#[test]
fn saved_data_round_trips_after_cache_reset() {
    let mut service = service();
    let user = service.create_user("alice").unwrap();
    let song = service
        .create_song(
            NewSong::new("Take 3", 1_700_000_000_123, 241.75).favorite(true),
            user.object_id,
        )
        .unwrap();

    let view = service.controller_mut().view_context_mut();
    view.reset();
    assert_eq!(view.registered_objects(), 0);
    assert_eq!(view.song(song.object_id).unwrap(), Some(song));
    assert_eq!(view.user(user.object_id).unwrap(), Some(user));
}

#[test]
fn seed_preview_data_adds_favorite_sample_song() {
    let mut service = service();
    let (user, song) = service.seed_preview_data().unwrap();
    assert_eq!(user.username, USERNAME);
    assert_eq!(song.title, PREVIEW_SONG_TITLE);
    assert!(song.is_favorite);
    assert_eq!(service.songs_for_user(USERNAME), vec![song]);
}

#[test]
fn songs_serialize_for_front_ends() {
    let mut service = service();
    let song = service.add_song(USERNAME).unwrap();
    let json = serde_json::to_value(&song).unwrap();
    assert_eq!(json["title"], NEW_SONG_TITLE);
    assert_eq!(json["is_favorite"], false);
}
