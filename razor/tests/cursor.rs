use razor::cursor::Cursor;

#[test]
fn tracks_lines_and_columns() {
    let mut cursor = Cursor::new("ab\ncd");
    assert_eq!(cursor.position().line, 1);
    assert_eq!(cursor.position().column, 1);

    cursor.advance();
    cursor.advance();
    assert_eq!(cursor.position().column, 3);
    assert_eq!(cursor.line_text(), "ab");

    assert_eq!(cursor.advance(), Some('\n'));
    let position = cursor.position();
    assert_eq!((position.line, position.column, position.offset), (2, 1, 3));
    assert_eq!(cursor.line_text(), "");
}

#[test]
fn peeks_without_consuming() {
    let mut cursor = Cursor::new("xy");
    assert_eq!(cursor.peek(), Some('x'));
    assert_eq!(cursor.peek_next(), Some('y'));
    assert_eq!(cursor.advance(), Some('x'));
    assert_eq!(cursor.peek_next(), None);
    assert_eq!(cursor.advance(), Some('y'));
    assert_eq!(cursor.advance(), None);
    assert!(cursor.at_end());
}

#[test]
fn step_back_is_limited_to_current_line() {
    let mut cursor = Cursor::new("ab\ncd");
    for _ in 0..4 {
        cursor.advance();
    }
    assert!(!cursor.step_back(2));
    assert_eq!(cursor.peek(), Some('d'));

    assert!(cursor.step_back(1));
    assert_eq!(cursor.peek(), Some('c'));
    assert_eq!(cursor.position().column, 1);
}

#[test]
fn skip_while_stops_at_first_mismatch() {
    let mut cursor = Cursor::new("   x");
    assert_eq!(cursor.skip_while(char::is_whitespace), Some('x'));
    assert_eq!(cursor.position().column, 4);
    assert_eq!(cursor.skip_while(|_| true), None);
}

#[test]
fn offsets_count_bytes() {
    let mut cursor = Cursor::new("é<");
    cursor.advance();
    let position = cursor.position();
    assert_eq!(position.offset, 2);
    assert_eq!(position.column, 2);
    assert_eq!(cursor.position_back(1).offset, 0);
}
