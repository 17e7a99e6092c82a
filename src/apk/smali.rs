//! Code index construction from smali sources.
//!
//! apktool disassembles every `classes*.dex` unit into a `smali*` folder, one `.smali` file per
//! class. Only the lines needed for the cross-reference index are read: class and method
//! declarations, invocations and string constants.

use std::{
    fs,
    path::{Path, PathBuf},
};

use failure::{Error, ResultExt};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use super::xref::{CodeIndex, CodeIndexBuilder, MethodRef};
use crate::utils::print_warning;

lazy_static! {
    static ref CLASS: Regex = Regex::new(r"^\.class\s+(?:[\w-]+\s+)*(L[^;\s]+;)").unwrap();
    static ref METHOD: Regex =
        Regex::new(r"^\.method\s+(?:[\w-]+\s+)*([^\s(]+)(\([^)]*\)\S+)").unwrap();
    static ref INVOKE: Regex = Regex::new(
        r"^invoke-[\w/-]+\s+\{[^}]*\},\s*(\[*L[^;]+;|\[+[A-Z])->([^\s(]+)(\([^)]*\)\S+)"
    )
    .unwrap();
    static ref CONST_STRING: Regex =
        Regex::new(r#"^const-string(?:/jumbo)?\s+(\w+),\s*"((?:[^"\\]|\\.)*)""#).unwrap();
}

/// Converts a type descriptor (`Lcom/example/Main;`) to a dotted class name
/// (`com.example.Main`). Array descriptors keep their brackets.
pub fn descriptor_to_class_name(descriptor: &str) -> String {
    let dimensions = descriptor.chars().take_while(|&c| c == '[').count();
    let element = &descriptor[dimensions..];
    let mut name = if element.starts_with('L') && element.ends_with(';') {
        element[1..element.len() - 1].replace('/', ".")
    } else {
        element.to_owned()
    };
    for _ in 0..dimensions {
        name.push_str("[]");
    }
    name
}

/// Resolves the escape sequences of a smali string literal.
fn unescape(literal: &str) -> String {
    let mut output = String::with_capacity(literal.len());
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => output.push('\n'),
            Some('t') => output.push('\t'),
            Some('r') => output.push('\r'),
            Some('u') => {
                let code: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&code, 16)
                    .ok()
                    .and_then(std::char::from_u32)
                {
                    Some(decoded) => output.push(decoded),
                    None => {
                        output.push_str("\\u");
                        output.push_str(&code);
                    }
                }
            }
            Some(other) => output.push(other),
            None => output.push('\\'),
        }
    }
    output
}

/// Adds the contents of one smali file to the index.
pub fn index_source(source: &str, builder: &mut CodeIndexBuilder) {
    let mut class_name: Option<String> = None;
    let mut current: Option<MethodRef> = None;

    for line in source.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = CLASS.captures(line) {
            class_name = Some(descriptor_to_class_name(&caps[1]));
        } else if let Some(caps) = METHOD.captures(line) {
            if let Some(ref class_name) = class_name {
                let method = MethodRef::new(class_name.as_str(), &caps[1], &caps[2]);
                let _ = builder.declare_method(&method);
                current = Some(method);
            }
        } else if line.starts_with(".end method") {
            current = None;
        } else if let Some(ref method) = current {
            if let Some(caps) = INVOKE.captures(line) {
                let callee =
                    MethodRef::new(descriptor_to_class_name(&caps[1]), &caps[2], &caps[3]);
                let _ = builder.add_call(method, &callee);
            } else if let Some(caps) = CONST_STRING.captures(line) {
                let _ = builder.add_string_read(unescape(&caps[2]), method, &caps[1]);
            }
        }
    }
}

/// Finds the smali folders of a decoded package: `smali`, `smali_classes2`, …
pub fn smali_folders<P: AsRef<Path>>(decoded: P) -> Result<Vec<PathBuf>, Error> {
    let mut folders = Vec::new();
    for entry in fs::read_dir(decoded.as_ref())
        .with_context(|_| format!("could not read {}", decoded.as_ref().display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.file_type()?.is_dir() && (name == "smali" || name.starts_with("smali_classes")) {
            folders.push(entry.path());
        }
    }
    folders.sort();
    Ok(folders)
}

fn add_files_to_vec(path: &Path, files: &mut Vec<PathBuf>) -> Result<(), Error> {
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();
        if entry.file_type()?.is_dir() {
            add_files_to_vec(&entry_path, files)?;
        } else if entry_path.extension().map_or(false, |e| e == "smali") {
            files.push(entry_path);
        }
    }
    Ok(())
}

/// Builds the code index of every smali file in the given folders.
///
/// Unreadable files are reported and skipped.
pub fn index_folders<P: AsRef<Path>>(folders: &[P]) -> Result<CodeIndex, Error> {
    let mut files = Vec::new();
    for folder in folders {
        add_files_to_vec(folder.as_ref(), &mut files)?;
    }
    files.sort();
    debug!("indexing {} smali files", files.len());

    let mut builder = CodeIndex::builder();
    for file in files {
        match fs::read_to_string(&file) {
            Ok(source) => index_source(&source, &mut builder),
            Err(e) => print_warning(format!(
                "could not read `{}`, its code will not be indexed: {}",
                file.display(),
                e
            )),
        }
    }
    Ok(builder.build())
}
