/// Split `content` into chunks of at most `max_chunk_bytes`, cutting only at
/// line boundaries.
///
/// Each line is charged its byte length plus one for the separator. A line
/// that alone exceeds the ceiling becomes its own oversized chunk; records are
/// never split. Joining the result with `'\n'` reproduces `content`.
pub fn chunk_content(content: &str, max_chunk_bytes: usize) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_bytes = 0usize;

    for line in content.split('\n') {
        let line_bytes = line.len().saturating_add(1);

        if !current.is_empty() && current_bytes.saturating_add(line_bytes) > max_chunk_bytes {
            chunks.push(current.join("\n"));
            current.clear();
            current_bytes = 0;
        }

        current.push(line);
        current_bytes = current_bytes.saturating_add(line_bytes);
    }

    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::chunk_content;

    fn assert_round_trip(content: &str, max: usize) {
        let chunks = chunk_content(content, max);
        assert_eq!(chunks.join("\n"), content, "max={max}");
    }

    fn assert_bounded(content: &str, max: usize) {
        for chunk in chunk_content(content, max) {
            let single_line = !chunk.contains('\n');
            assert!(
                chunk.len() <= max || single_line,
                "chunk of {} bytes exceeds {max}: {chunk:?}",
                chunk.len()
            );
        }
    }

    #[test]
    fn splits_on_line_boundaries() {
        let chunks = chunk_content("line-one\nline-two\nline-three", 10);
        assert_eq!(chunks, vec!["line-one", "line-two", "line-three"]);
    }

    #[test]
    fn packs_lines_until_the_ceiling() {
        let chunks = chunk_content("aa\nbb\ncc\ndd", 6);
        assert_eq!(chunks, vec!["aa\nbb", "cc\ndd"]);
    }

    #[test]
    fn oversized_line_becomes_its_own_chunk() {
        let big = "x".repeat(50);
        let content = format!("a\n{big}\nb");
        let chunks = chunk_content(&content, 10);
        assert_eq!(chunks, vec!["a".to_string(), big, "b".to_string()]);
    }

    #[test]
    fn small_input_is_a_single_chunk() {
        let chunks = chunk_content("{\"a\":1}\n{\"b\":2}", 1024 * 1024);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_content("", 10).is_empty());
    }

    #[test]
    fn round_trip_holds_across_sizes_and_shapes() {
        let samples = [
            "single",
            "a\nb\nc",
            "\n",
            "\n\n\nx\n",
            "trailing newline\n",
            "ünïcödé line\nanother ünïcödé line\n{\"k\":\"v\"}",
            "short\nmuch much much longer line here\nmid length",
        ];
        for sample in samples {
            for max in [1, 2, 3, 5, 8, 13, 64, 4096] {
                assert_round_trip(sample, max);
                assert_bounded(sample, max);
            }
        }
    }

    #[test]
    fn multibyte_lengths_are_counted_in_bytes() {
        // each line is 4 bytes ("éé") + 1 separator
        let chunks = chunk_content("éé\néé\néé", 10);
        assert_eq!(chunks, vec!["éé\néé", "éé"]);
    }
}
