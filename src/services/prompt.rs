//! Prompt construction for the perspective generation call

/// Reply the model is instructed to give for topics it cannot analyse
pub const REJECTION_PHRASE: &str = "provide valid input";

/// Number of entries requested for each band
///
/// Shares are equal; the remainder goes to the earliest bands.
pub fn band_sizes(count: usize, band_count: usize) -> Vec<usize> {
    if band_count == 0 {
        return Vec::new();
    }
    let share = count / band_count;
    let remainder = count % band_count;
    (0..band_count)
        .map(|index| share + usize::from(index < remainder))
        .collect()
}

/// System instruction asking for `count` perspectives across `bands`
pub fn system_instruction(count: usize, bands: &[String]) -> String {
    let sizes = band_sizes(count, bands.len());
    let gradient = bands.join(" → ");
    let distribution = bands
        .iter()
        .zip(&sizes)
        .map(|(band, size)| format!("{band}: {size}"))
        .collect::<Vec<_>>()
        .join(", ");

    let first = bands.first().map_or("", String::as_str);
    let last = bands.last().map_or("", String::as_str);

    format!(
        r#"Your task: generate UNIQUE perspectives, or ways to look at the information, on the given input.

Rules:
1. If the input is political, generate political perspectives.
2. If the input is non-political, generate perspectives for that topic.
3. If the input is nonsense or cannot be analysed (e.g. "hello", "haaaa"), output: "{REJECTION_PHRASE}".
4. Do not repeat perspectives. Each perspective must be unique, not rephrased.

Output:
- Always exactly {count} perspectives ({distribution}).
- Ordered as a gradient: {gradient}.
- {first} is the most extreme on one side, {last} the most extreme on the other; each band shifts gradually towards the next.

Format:
Output must ONLY be JSON (no text, no notes).

JSON format:
{{
  "perspectives": [
    {{"color": "{first}", "view": "Perspective 1..."}},
    ...
    {{"color": "{last}", "view": "Perspective {count}..."}}
  ]
}}
"#
    )
}

/// Full ChatML prompt for `topic`
pub fn build_prompt(topic: &str, count: usize, bands: &[String]) -> String {
    format!(
        "<|im_start|>system\n{}<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
        system_instruction(count, bands),
        topic.trim()
    )
}
