//! Language → trusted base image and run-command mapping.

use crucible_core::Language;

/// Registry entry for one language: which image runs it and how.
#[derive(Debug, Clone, Copy)]
pub struct ImageSpec {
    /// Trusted base image reference.
    pub image: &'static str,
    /// Canonical main-file name the request's code is staged as.
    pub main_file: &'static str,
    /// Run command. A shell is involved only for compile-then-run chains,
    /// and the only token those chains contain beyond fixed text is the
    /// staged main-file name, never caller-supplied content.
    pub command: &'static [&'static str],
}

impl ImageSpec {
    pub fn command_vec(&self) -> Vec<String> {
        self.command.iter().map(|s| (*s).to_owned()).collect()
    }
}

/// Resolve a language to its image spec. Pure function over a fixed table.
pub fn resolve(language: Language) -> ImageSpec {
    match language {
        Language::Python => ImageSpec {
            image: "python:3.11-slim",
            main_file: "main.py",
            command: &["python", "main.py"],
        },
        Language::JavaScript => ImageSpec {
            image: "node:20-slim",
            main_file: "main.js",
            command: &["node", "main.js"],
        },
        Language::TypeScript => ImageSpec {
            image: "node:20-slim",
            main_file: "main.ts",
            command: &["sh", "-c", "tsc main.ts && node main.js"],
        },
        Language::Rust => ImageSpec {
            image: "rust:1.75-slim",
            main_file: "main.rs",
            command: &["sh", "-c", "rustc main.rs && ./main"],
        },
        Language::Go => ImageSpec {
            image: "golang:1.22-alpine",
            main_file: "main.go",
            command: &["go", "run", "main.go"],
        },
    }
}
