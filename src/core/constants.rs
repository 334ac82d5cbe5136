//! Platform limits and PCM format constants shared across the crate.

/// Most embeds one message carries.
pub const MAX_EMBEDS: usize = 10;
/// Most uploaded files one message carries.
pub const MAX_FILES: usize = 10;
/// Most top-level component rows one message carries.
pub const MAX_ROWS: usize = 5;
/// Most top-level components in a layout (components v2) message.
pub const MAX_LAYOUT_COMPONENTS: usize = 40;
/// Most buttons in one action row.
pub const MAX_ROW_BUTTONS: usize = 5;
pub const MAX_SELECT_OPTIONS: usize = 25;
pub const MAX_POLL_ANSWERS: usize = 10;

pub const CONTENT_LIMIT: usize = 2000;
pub const BUTTON_LABEL_LIMIT: usize = 80;
pub const PLACEHOLDER_LIMIT: usize = 150;
pub const OPTION_TEXT_LIMIT: usize = 100;
pub const EMBED_TITLE_LIMIT: usize = 256;
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;
pub const FIELD_NAME_LIMIT: usize = 256;
pub const FIELD_VALUE_LIMIT: usize = 1024;
pub const FOOTER_LIMIT: usize = 2048;
pub const POLL_QUESTION_LIMIT: usize = 300;
pub const POLL_ANSWER_LIMIT: usize = 55;

/// Default poll duration when none is given.
pub const DEFAULT_POLL_HOURS: u32 = 24;

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;
pub const BYTES_PER_SAMPLE: u32 = 2;
pub const TICK_MS: u64 = 20;
/// 48000 Hz * 2 channels * 2 bytes * 20 ms.
pub const BYTES_PER_TICK: usize =
    (SAMPLE_RATE * CHANNELS * BYTES_PER_SAMPLE) as usize * TICK_MS as usize / 1000;
pub const BYTES_PER_SECOND: usize = (SAMPLE_RATE * CHANNELS * BYTES_PER_SAMPLE) as usize;

/// Process-wide cap on concurrent transcoder processes.
pub const DEFAULT_MAX_TRANSCODES: usize = 20;
