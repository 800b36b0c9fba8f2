/// Tokens held back from the context window on top of the reserved output
/// budget, so prompt scaffolding never pushes a call over the limit.
pub const INPUT_BUDGET_SAFETY_MARGIN: usize = 1000;

/// Floor for the computed input budget; below this, chunking degenerates.
pub const MIN_INPUT_BUDGET_TOKENS: usize = 200;

/// Linear backoff step per attempt, in seconds.
pub const RETRY_BACKOFF_STEP_SECS: i64 = 60;

/// Cap on the retry backoff delay, in seconds.
pub const RETRY_BACKOFF_CAP_SECS: i64 = 300;

/// How far back to search `existing` for a suffix that prefixes the new
/// continuation output.
pub const OVERLAP_SEARCH_WINDOW_CHARS: usize = 600;

/// Shortest overlap accepted as a real duplication rather than coincidence.
pub const OVERLAP_MIN_MATCH_CHARS: usize = 40;

/// Tail of the accumulated output embedded into a continuation prompt so the
/// model can pick up mid-sentence.
pub const CONTINUATION_TAIL_CHARS: usize = 1200;

/// Default automatic retry budget for a freshly enqueued task.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Validation rejects cleaned output shorter than this fraction of the
/// source, measured in characters.
pub const CLEANED_MIN_LENGTH_RATIO: f64 = 0.10;

/// System prompt for the cleaning stage - strip boilerplate, keep content
pub const CLEANING_SYSTEM_PROMPT: &str = "You are a content cleaning assistant. You receive a fragment of a markdown article scraped from the web. Remove navigation remnants, advertising, cookie banners, share buttons and unrelated boilerplate. Preserve all substantive text, headings, code blocks, tables and links exactly. Output only the cleaned markdown fragment, with no commentary and no labels.";

/// System prompt for the classification stage - category plus language
pub const CLASSIFICATION_SYSTEM_PROMPT: &str = "You classify articles. Given the article below, respond with a single JSON object of the form {\"category\": \"<one of the allowed categories>\", \"language\": \"<ISO 639-1 code of the main language>\"}. No other text.";

/// System prompt for summary generation
pub const SUMMARY_SYSTEM_PROMPT: &str = "Write a concise summary of the following article in its own language. Three to five sentences, plain prose, no headings, no bullet points.";

/// System prompt for outline generation
pub const OUTLINE_SYSTEM_PROMPT: &str = "Produce a hierarchical outline of the following article as a markdown bullet list. Use the article's own wording for section names where possible.";

/// System prompt for key-points generation
pub const KEY_POINTS_SYSTEM_PROMPT: &str = "Extract the key points of the following article as a flat markdown bullet list, one point per line, most important first.";

/// System prompt for notable-quotes extraction
pub const QUOTES_SYSTEM_PROMPT: &str = "Extract up to five notable verbatim quotes from the following article as a markdown bullet list. Only text that appears word-for-word in the article.";

/// System prompt template for the translation stage; `{language}` is
/// replaced with the configured target language.
pub const TRANSLATION_SYSTEM_PROMPT: &str = "You are a professional translator. Translate the following markdown fragment into {language}. Preserve the markdown structure, code blocks and tables unchanged; translate prose, headings and table cells. Output only the translated fragment.";

/// Instruction prepended when asking the model to continue truncated output.
pub const CONTINUATION_INSTRUCTION: &str = "Your previous answer was cut off. Continue exactly where it stopped. Do not repeat anything you already wrote, do not apologise, do not summarise. The end of your previous answer was:";
