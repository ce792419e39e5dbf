// Integration tests for persistent conversation history

use anyhow::Result;
use voice_session::history::{
    build_system_instruction, FileHistoryStore, HistoryEntry, HistoryStore, Speaker,
    HISTORY_LIMIT,
};

fn entry(i: usize) -> HistoryEntry {
    let speaker = if i % 2 == 0 {
        Speaker::User
    } else {
        Speaker::Assistant
    };
    HistoryEntry::new(format!("turn {}", i), speaker)
}

#[test]
fn test_keeps_most_recent_entries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = FileHistoryStore::open(dir.path().to_str().unwrap())?;

    for i in 0..25 {
        store.append(entry(i))?;
    }

    let entries = store.list()?;
    assert_eq!(entries.len(), HISTORY_LIMIT);
    assert_eq!(entries.first().unwrap().text, "turn 5");
    assert_eq!(entries.last().unwrap().text, "turn 24");

    Ok(())
}

#[test]
fn test_persists_across_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().to_str().unwrap();

    {
        let store = FileHistoryStore::open(path)?;
        store.append(HistoryEntry::new("Remember the milk", Speaker::User))?;
        store.append(HistoryEntry::new("Noted.", Speaker::Assistant))?;
    }

    let store = FileHistoryStore::open(path)?;
    let entries = store.list()?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].speaker, Speaker::User);
    assert_eq!(entries[1].text, "Noted.");
    assert!(store.path().exists());

    Ok(())
}

#[test]
fn test_clear_removes_everything() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().to_str().unwrap();

    let store = FileHistoryStore::open(path)?;
    store.append(entry(0))?;
    store.clear()?;
    assert!(store.list()?.is_empty());

    let reopened = FileHistoryStore::open(path)?;
    assert!(reopened.list()?.is_empty());

    Ok(())
}

#[test]
fn test_corrupt_file_reads_as_empty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = FileHistoryStore::open(dir.path().to_str().unwrap())?;
    std::fs::write(store.path(), "{ not json")?;

    assert!(store.list()?.is_empty());

    // And recovers on the next write
    store.append(entry(0))?;
    assert_eq!(store.list()?.len(), 1);

    Ok(())
}

#[test]
fn test_instruction_carries_history() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = FileHistoryStore::open(dir.path().to_str().unwrap())?;
    store.append(HistoryEntry::new("Hi", Speaker::User))?;
    store.append(HistoryEntry::new("Hello!", Speaker::Assistant))?;

    let instruction = build_system_instruction("Be brief.", &store.list()?);
    assert_eq!(
        instruction,
        "Be brief.\n\nConversation so far:\nUser: Hi\nAssistant: Hello!"
    );

    Ok(())
}
