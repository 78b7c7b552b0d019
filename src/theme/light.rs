//! Light palette
//!
//! High contrast text on a white page, the default for exports that are
//! pasted into word processors.

use super::{BaseColors, MarkdownColors, Rgb, TextColors, ThemeColors};

/// Build the light palette.
pub fn palette() -> ThemeColors {
    ThemeColors {
        base: BaseColors {
            background: Rgb::new(255, 255, 255),
            background_tertiary: Rgb::new(245, 245, 245),
            border: Rgb::new(200, 200, 200),
        },
        text: TextColors {
            primary: Rgb::new(30, 30, 30),
            muted: Rgb::new(120, 120, 120),
            link: Rgb::new(0, 100, 180),
            code: Rgb::new(80, 80, 80),
            error: Rgb::new(220, 53, 69),
        },
        markdown: MarkdownColors {
            heading: Rgb::new(0, 100, 180),
            blockquote_border: Rgb::new(200, 200, 200),
            blockquote_text: Rgb::new(100, 100, 100),
            code_block_bg: Rgb::new(233, 236, 239),
            code_block_border: Rgb::new(195, 202, 210),
            horizontal_rule: Rgb::new(200, 200, 200),
            table_border: Rgb::new(200, 205, 210),
            table_header_bg: Rgb::new(240, 242, 245),
        },
    }
}
