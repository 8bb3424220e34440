use songvault_core::{
    Attribute, BatchDeleteRequest, Entity, EntityKind, FetchRequest, NewSong,
    PersistenceController, PersistenceError, Song, User, ValidationError,
};
use uuid::Uuid;

fn controller() -> PersistenceController {
    PersistenceController::open_in_memory().unwrap()
}

#[test]
fn inserted_objects_become_durable_on_save() {
    let mut controller = controller();
    let user = User::new("alice");
    let song = Song::new(NewSong::new("Intro", 1_000, 90.5), user.object_id);

    let view = controller.view_context_mut();
    view.insert(user.clone()).unwrap();
    view.insert(song.clone()).unwrap();
    assert!(view.has_changes());
    view.save().unwrap();
    assert!(!view.has_changes());

    let mut other = controller.new_background_context();
    assert_eq!(other.song(song.object_id).unwrap(), Some(song));
    assert_eq!(other.user(user.object_id).unwrap(), Some(user));
}

#[test]
fn save_without_changes_is_a_no_op() {
    let mut controller = controller();
    let before = controller.store().commit_sequence();
    controller.view_context_mut().save().unwrap();
    controller.save_context().unwrap();
    assert_eq!(controller.store().commit_sequence(), before);
}

#[test]
fn insert_rejects_duplicates_and_songs_without_live_owner() {
    let mut controller = controller();
    let view = controller.view_context_mut();
    let user = User::new("alice");
    view.insert(user.clone()).unwrap();

    let duplicate = view.insert(user.clone()).unwrap_err();
    assert!(matches!(duplicate, PersistenceError::DuplicateObject(id) if id == user.object_id));

    let ghost = User::new("ghost");
    let orphan = Song::new(NewSong::new("Orphan", 1, 1.0), ghost.object_id);
    let err = view.insert(orphan).unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound(id) if id == ghost.object_id));
}

#[test]
fn typed_lookup_rejects_wrong_kind() {
    let mut controller = controller();
    let user = User::new("alice");
    let err = controller
        .view_context_mut()
        .song(user.object_id)
        .unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::WrongEntity {
            expected: EntityKind::Song,
            found: EntityKind::User
        }
    ));
}

#[test]
fn unique_id_is_immutable() {
    let mut controller = controller();
    let view = controller.view_context_mut();
    let user = User::new("alice");
    view.insert(user.clone()).unwrap();
    view.save().unwrap();

    let err = view
        .set(user.object_id, Attribute::UniqueId, Uuid::new_v4())
        .unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::Validation(ValidationError::ImmutableAttribute(Attribute::UniqueId))
    ));

    view.set(user.object_id, Attribute::UniqueId, user.unique_id)
        .unwrap();
    assert!(!view.has_changes());
}

#[test]
fn set_validates_values() {
    let mut controller = controller();
    let view = controller.view_context_mut();
    let user = User::new("alice");
    let song = Song::new(NewSong::new("Intro", 1, 1.0), user.object_id);
    view.insert(user.clone()).unwrap();
    view.insert(song.clone()).unwrap();
    view.save().unwrap();

    assert!(matches!(
        view.set(song.object_id, Attribute::Duration, -1.0),
        Err(PersistenceError::Validation(ValidationError::InvalidDuration(_)))
    ));
    assert!(matches!(
        view.set(user.object_id, Attribute::Username, ""),
        Err(PersistenceError::Validation(ValidationError::EmptyUsername))
    ));
    assert!(!view.has_changes());
}

#[test]
fn deleting_unsaved_object_forgets_it() {
    let mut controller = controller();
    let view = controller.view_context_mut();
    let user = User::new("alice");
    view.insert(user.clone()).unwrap();
    view.delete(user.object_id).unwrap();

    assert!(!view.has_changes());
    assert_eq!(view.object(user.object_id).unwrap(), None);
}

#[test]
fn rollback_restores_stored_state() {
    let mut controller = controller();
    let view = controller.view_context_mut();
    let user = User::new("alice");
    let first = Song::new(NewSong::new("First", 1, 1.0), user.object_id);
    let second = Song::new(NewSong::new("Second", 2, 1.0), user.object_id);
    view.insert(user.clone()).unwrap();
    view.insert(first.clone()).unwrap();
    view.insert(second.clone()).unwrap();
    view.save().unwrap();

    view.set(first.object_id, Attribute::Title, "Edited").unwrap();
    view.delete(second.object_id).unwrap();
    let extra = User::new("bob");
    view.insert(extra.clone()).unwrap();
    assert!(view.has_changes());

    view.rollback().unwrap();
    assert!(!view.has_changes());
    assert_eq!(view.song(first.object_id).unwrap(), Some(first));
    assert_eq!(view.song(second.object_id).unwrap(), Some(second));
    assert_eq!(view.object(extra.object_id).unwrap(), None);
}

#[test]
fn deleting_user_cascades_to_owned_songs() {
    let mut controller = controller();
    let user = User::new("alice");
    let songs: Vec<Song> = (0..2)
        .map(|index| Song::new(NewSong::new(format!("Song {index}"), index, 1.0), user.object_id))
        .collect();

    let view = controller.view_context_mut();
    view.insert(user.clone()).unwrap();
    for song in &songs {
        view.insert(song.clone()).unwrap();
    }
    view.save().unwrap();

    view.delete(user.object_id).unwrap();
    for song in &songs {
        assert_eq!(view.object(song.object_id).unwrap(), None);
    }
    view.save().unwrap();

    let mut other = controller.new_background_context();
    assert_eq!(other.count(&FetchRequest::new(EntityKind::Song)).unwrap(), 0);
    assert_eq!(other.count(&FetchRequest::new(EntityKind::User)).unwrap(), 0);
}

#[test]
fn fetch_merges_pending_changes_sorts_and_limits() {
    let mut controller = controller();
    let view = controller.view_context_mut();
    let user = User::new("alice");
    view.insert(user.clone()).unwrap();
    let dated = |title: &str, date: i64| Song::new(NewSong::new(title, date, 1.0), user.object_id);
    let (one, three, two) = (dated("one", 1), dated("three", 3), dated("two", 2));
    for song in [&one, &three, &two] {
        view.insert(song.clone()).unwrap();
    }
    view.save().unwrap();

    let pending = dated("four", 4);
    view.insert(pending.clone()).unwrap();
    view.delete(two.object_id).unwrap();

    let titles: Vec<String> = view
        .fetch(&FetchRequest::songs_for_username("alice"))
        .unwrap()
        .into_iter()
        .filter_map(Entity::into_song)
        .map(|song| song.title)
        .collect();
    assert_eq!(titles, vec!["four", "three", "one"]);

    let limited = view
        .fetch(&FetchRequest::songs_for_username("alice").limit(2))
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert!(view
        .fetch(&FetchRequest::songs_for_username("nobody"))
        .unwrap()
        .is_empty());
    assert_eq!(view.count(&FetchRequest::new(EntityKind::Song)).unwrap(), 3);
}

#[test]
fn fetch_by_owner_follows_unsaved_owner_edits() {
    let mut controller = controller();
    let user = User::new("old");
    let song = Song::new(NewSong::new("Track", 1, 1.0), user.object_id);
    {
        let view = controller.view_context_mut();
        view.insert(user.clone()).unwrap();
        view.insert(song.clone()).unwrap();
        view.save().unwrap();
        view.set(user.object_id, Attribute::Username, "new").unwrap();

        let under_new = view.fetch(&FetchRequest::songs_for_username("new")).unwrap();
        assert_eq!(under_new, vec![Entity::Song(song.clone())]);
        assert!(view
            .fetch(&FetchRequest::songs_for_username("old"))
            .unwrap()
            .is_empty());
    }

    // Songs not yet cached are found through the edited owner too.
    let mut other = controller.new_background_context();
    other.set(user.object_id, Attribute::Username, "renamed").unwrap();
    assert!(!other.is_registered(song.object_id));
    assert_eq!(
        other.count(&FetchRequest::songs_for_username("renamed")).unwrap(),
        1
    );
    assert_eq!(
        other.count(&FetchRequest::songs_for_username("old")).unwrap(),
        0
    );
}

#[test]
fn fetch_rejects_request_for_foreign_attribute() {
    let mut controller = controller();
    let request = FetchRequest::new(EntityKind::User).filter(songvault_core::Predicate::is(
        Attribute::Title,
        "x",
    ));
    let err = controller.view_context_mut().fetch(&request).unwrap_err();
    assert!(matches!(err, PersistenceError::Fetch(_)));
}

#[test]
fn failed_save_keeps_pending_changes() {
    let mut controller = controller();
    let user = User::new("alice");
    let song = Song::new(NewSong::new("Late", 1, 1.0), user.object_id);
    {
        let view = controller.view_context_mut();
        view.insert(user.clone()).unwrap();
        view.save().unwrap();
        view.insert(song.clone()).unwrap();
    }

    let background = controller.new_background_context();
    background
        .execute_batch_delete(&BatchDeleteRequest::all(EntityKind::User))
        .unwrap();

    let view = controller.view_context_mut();
    let err = view.save().unwrap_err();
    assert!(matches!(err, PersistenceError::Save(_)));
    assert!(view.has_changes());
    assert!(view.cached(song.object_id).is_some());

    view.rollback().unwrap();
    assert!(!view.has_changes());
    assert!(view.cached(song.object_id).is_none());
}

#[test]
fn grouped_batch_deletes_commit_together_or_not_at_all() {
    let mut controller = controller();
    let user = User::new("alice");
    let song = Song::new(NewSong::new("Survivor", 1, 1.0), user.object_id);
    {
        let view = controller.view_context_mut();
        view.insert(user.clone()).unwrap();
        view.insert(song.clone()).unwrap();
        view.save().unwrap();
    }
    let before = controller.store().commit_sequence();

    let view = controller.view_context_mut();
    let err = view
        .execute_batch_deletes(&[
            BatchDeleteRequest::all(EntityKind::Song),
            BatchDeleteRequest::matching(
                EntityKind::User,
                songvault_core::Predicate::is(Attribute::Title, "x"),
            ),
        ])
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Save(_)));
    assert_eq!(controller.store().commit_sequence(), before);

    let mut other = controller.new_background_context();
    assert_eq!(other.song(song.object_id).unwrap(), Some(song));

    let view = controller.view_context_mut();
    let result = view
        .execute_batch_deletes(&[
            BatchDeleteRequest::all(EntityKind::Song),
            BatchDeleteRequest::all(EntityKind::User),
        ])
        .unwrap();
    assert_eq!(result.deleted.len(), 2);
    assert_eq!(result.commit_sequence, before + 1);
    assert_eq!(controller.store().commit_sequence(), before + 1);
}
