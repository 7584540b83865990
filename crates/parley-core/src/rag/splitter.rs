/// Splits text into overlapping windows of at most `chunk_size` bytes,
/// preferring paragraph, then line, then word boundaries.
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                " ".to_string(),
                "".to_string(),
            ],
        }
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Split text into chunks based on the configured parameters
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if text.len() <= self.chunk_size {
            return vec![text.to_string()];
        }

        self.recursive_split(text, &self.separators)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn recursive_split(&self, text: &str, separators: &[String]) -> Vec<String> {
        let Some((separator, remaining_separators)) = separators.split_first() else {
            return self.split_by_length(text);
        };

        if separator.is_empty() {
            return self.split_by_length(text);
        }

        let mut final_chunks = Vec::new();
        let mut current_chunk = String::new();

        for split in text.split(separator.as_str()) {
            if split.len() > self.chunk_size {
                if !current_chunk.is_empty() {
                    final_chunks.push(std::mem::take(&mut current_chunk));
                }
                final_chunks.extend(self.recursive_split(split, remaining_separators));
                continue;
            }

            let candidate = join(&current_chunk, separator, split);
            if candidate.len() <= self.chunk_size {
                current_chunk = candidate;
                continue;
            }

            // Current chunk is full: emit it and carry its tail forward
            let tail = self.overlap_tail(&current_chunk, separator).to_string();
            final_chunks.push(std::mem::take(&mut current_chunk));

            let with_overlap = join(&tail, separator, split);
            current_chunk = if with_overlap.len() <= self.chunk_size {
                with_overlap
            } else {
                split.to_string()
            };
        }

        if !current_chunk.is_empty() {
            final_chunks.push(current_chunk);
        }

        final_chunks
    }

    /// The last `chunk_overlap` bytes of `chunk`, starting on a separator
    /// boundary when one is available.
    fn overlap_tail<'a>(&self, chunk: &'a str, separator: &str) -> &'a str {
        if self.chunk_overlap == 0 || chunk.len() <= self.chunk_overlap {
            return if self.chunk_overlap == 0 { "" } else { chunk };
        }

        let mut overlap_start = chunk.len() - self.chunk_overlap;
        while overlap_start > 0 && !chunk.is_char_boundary(overlap_start) {
            overlap_start -= 1;
        }

        let tail = &chunk[overlap_start..];
        if chunk[..overlap_start].ends_with(separator) {
            return tail;
        }
        match tail.find(separator) {
            Some(pos) => &tail[pos + separator.len()..],
            None => tail,
        }
    }

    fn split_by_length(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let mut end = (start + self.chunk_size).min(text.len());

            while end > start && !text.is_char_boundary(end) {
                end -= 1;
            }
            if end == start {
                // A single character wider than the window
                end = start + text[start..].chars().next().map(char::len_utf8).unwrap_or(1);
            }

            chunks.push(text[start..end].to_string());

            if self.chunk_overlap > 0 && end < text.len() {
                let mut new_start = end - self.chunk_overlap.min(end - start);
                while new_start > start && !text.is_char_boundary(new_start) {
                    new_start -= 1;
                }
                start = if new_start > start { new_start } else { end };
            } else {
                start = end;
            }
        }

        chunks
    }
}

fn join(current: &str, separator: &str, split: &str) -> String {
    if current.is_empty() {
        split.to_string()
    } else {
        format!("{}{}{}", current, separator, split)
    }
}
