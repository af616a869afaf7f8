//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [base] Section Defaults
// ============================================================================

pub mod base {
    pub fn url() -> Option<String> {
        None
    }

    pub fn author() -> String {
        "<YOUR_NAME>".into()
    }

    pub fn email() -> String {
        "user@noreply.quill".into()
    }

    pub fn language() -> String {
        "en".into()
    }
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn content() -> PathBuf {
        "content/blog".into()
    }

    pub fn assets() -> PathBuf {
        "content/assets".into()
    }

    pub fn output() -> PathBuf {
        "public".into()
    }

    pub mod transform {
        pub fn chain() -> Vec<String> {
            [
                "markdown",
                "images",
                "iframes",
                "highlight",
                "links",
                "reading_time",
                "excerpt",
            ]
            .into_iter()
            .map(String::from)
            .collect()
        }
    }

    pub mod images {
        use super::super::super::ImageFormat;

        pub fn widths() -> Vec<u32> {
            vec![148, 295, 590, 885, 1180, 1770]
        }

        pub fn formats() -> Vec<ImageFormat> {
            vec![ImageFormat::Webp, ImageFormat::Jpeg]
        }

        pub fn max_width() -> u32 {
            590
        }

        pub fn quality() -> u8 {
            80
        }
    }

    pub mod iframes {
        pub fn wrapper_style() -> String {
            "margin-bottom: 1.0725rem".into()
        }
    }

    pub mod highlight {
        pub fn user() -> String {
            "root".into()
        }

        pub fn host() -> String {
            "localhost".into()
        }

        pub fn command_line_languages() -> Vec<String> {
            ["bash", "sh", "shell", "zsh", "console"]
                .into_iter()
                .map(String::from)
                .collect()
        }
    }

    pub mod reading_time {
        pub fn words_per_minute() -> u32 {
            200
        }
    }

    pub mod excerpt {
        pub fn length() -> usize {
            140
        }
    }

    pub mod feed {
        use std::path::PathBuf;

        pub fn path() -> PathBuf {
            "rss.xml".into()
        }
    }

    pub mod sitemap {
        use std::path::PathBuf;

        pub fn path() -> PathBuf {
            "sitemap.xml".into()
        }
    }

    pub mod manifest {
        use std::path::PathBuf;

        pub fn path() -> PathBuf {
            "manifest.webmanifest".into()
        }

        pub fn start_url() -> String {
            "/".into()
        }

        pub fn background_color() -> String {
            "#ffffff".into()
        }

        pub fn theme_color() -> String {
            "#663399".into()
        }

        pub fn display() -> String {
            "minimal-ui".into()
        }

        pub fn icon() -> Option<PathBuf> {
            None
        }

        pub fn icon_sizes() -> Vec<u32> {
            vec![48, 72, 96, 144, 192, 256, 384, 512]
        }
    }
}

// ============================================================================
// [watch] Section Defaults
// ============================================================================

pub mod watch {
    pub fn debounce_ms() -> u64 {
        300
    }

    pub fn cooldown_ms() -> u64 {
        800
    }
}
