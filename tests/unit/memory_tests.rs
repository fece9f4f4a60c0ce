/*!
 * Tests for the translation memory table
 */

use bgasync::errors::LoadError;
use bgasync::sync::TranslationMemory;

use crate::common;

/// Test loading a table from disk
#[test]
fn test_load_withValidTable_shouldExposeRows() {
    let temp_dir = common::create_temp_dir().unwrap();
    let content = common::table(&[("Move 3 spaces", "移动3格"), ("Draw a card", "抽一张牌")]);
    let path = common::create_test_file(temp_dir.path(), "untranslated.md", &content).unwrap();

    let memory = TranslationMemory::load(&path).unwrap();

    assert_eq!(memory.len(), 2);
    assert_eq!(memory.lookup("Move 3 spaces"), Some("移动3格"));
    assert_eq!(memory.source(), Some(path.as_path()));
}

/// Test that a missing file is an IO load error
#[test]
fn test_load_withMissingFile_shouldFailWithIo() {
    let temp_dir = common::create_temp_dir().unwrap();
    let result = TranslationMemory::load(temp_dir.path().join("missing.md"));
    assert!(matches!(result, Err(LoadError::Io { .. })));
}

/// Test that a header-only table is rejected
#[test]
fn test_load_withHeaderOnly_shouldFailAsEmpty() {
    let temp_dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(temp_dir.path(), "t.md", &common::table(&[])).unwrap();
    assert!(matches!(TranslationMemory::load(&path), Err(LoadError::EmptyTable(_))));
}

/// Test last-non-empty-wins semantics over a mixed table
#[test]
fn test_lookup_withDuplicatesAndEmpties_shouldReturnLastNonEmpty() {
    let rows = [
        ("alpha", "一"),
        ("beta", ""),
        ("alpha", "二"),
        ("gamma", "三"),
        ("alpha", ""),
        ("", "orphan"),
        ("delta", ""),
    ];
    let memory = TranslationMemory::parse(&common::table(&rows));

    for key in ["alpha", "beta", "gamma", "delta", "missing"] {
        let expected = rows
            .iter()
            .filter(|(k, v)| *k == key && !v.is_empty())
            .map(|(_, v)| *v)
            .last();
        assert_eq!(memory.lookup(key), expected, "key {}", key);
    }
    assert_eq!(memory.lookup(""), None);
}

/// Test Windows line endings and surrounding prose
#[test]
fn test_parse_withCrlfAndProse_shouldOnlyReadRows() {
    let content = "# 翻译内容\r\n\r\nSome notes | not a row\r\n| 原文 | 上下文 | 译文 |\r\n|---|:--:|---|\r\n| End turn | button | 结束回合 |\r\n";
    let memory = TranslationMemory::parse(content);
    assert_eq!(memory.len(), 1);
    assert_eq!(memory.lookup("End turn"), Some("结束回合"));
}

/// Test that cells are trimmed but lookups are exact
#[test]
fn test_lookup_withPaddedCells_shouldMatchTrimmedKey() {
    let memory = TranslationMemory::parse("|   Pass   | | 跳过 |\n");
    assert_eq!(memory.lookup("Pass"), Some("跳过"));
    assert_eq!(memory.lookup("Pass "), None);
}
