//! Staged per-category output.
//!
//! Generated text is appended to three temporary sinks in the output
//! directory while a category's operations run. Finalizing promotes them to
//! `<name>.type.ts` and `<name>.ts`; discarding (or dropping) removes them.
//! Either both final files appear or neither does.

use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexSet;
use tempfile::NamedTempFile;

use crate::emit;

/// An append-only temporary file.
struct Sink {
    inner: Mutex<SinkState>,
}

struct SinkState {
    file: NamedTempFile,
    written: u64,
}

impl Sink {
    fn create(dir: &Path, prefix: &str, kind: &str) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(&format!("{prefix}-{kind}-"))
            .suffix(".ts")
            .tempfile_in(dir)?;
        Ok(Self {
            inner: Mutex::new(SinkState { file, written: 0 }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, text: &str) -> io::Result<()> {
        let mut state = self.lock();
        state.file.write_all(text.as_bytes())?;
        state.written += text.len() as u64;
        Ok(())
    }

    /// Append `opener` first if nothing was written yet, then `text`.
    fn append_opened(&self, opener: &str, text: &str) -> io::Result<()> {
        let mut state = self.lock();
        if state.written == 0 {
            state.file.write_all(opener.as_bytes())?;
            state.written += opener.len() as u64;
        }
        state.file.write_all(text.as_bytes())?;
        state.written += text.len() as u64;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.lock().written == 0
    }

    fn mark(&self) -> u64 {
        self.lock().written
    }

    /// Cut the sink back to an earlier [`Sink::mark`].
    fn rollback(&self, mark: u64) -> io::Result<()> {
        let mut state = self.lock();
        if state.written <= mark {
            return Ok(());
        }
        state.file.as_file().set_len(mark)?;
        state.file.seek(SeekFrom::Start(mark))?;
        state.written = mark;
        Ok(())
    }

    fn into_inner(self) -> SinkState {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SinkState {
    fn contents(&mut self) -> io::Result<String> {
        self.file.flush()?;
        fs::read_to_string(self.file.path())
    }
}

/// Files produced by [`StagedOutput::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedFiles {
    pub type_file: Option<PathBuf>,
    pub code_file: PathBuf,
}

/// Three sinks (declarations, function bodies, type imports) plus the
/// request methods seen and a flag set once any function body was written.
pub struct StagedOutput {
    dir: PathBuf,
    request_api_path: String,
    typings: Sink,
    codes: Sink,
    imports: Sink,
    methods: Mutex<IndexSet<String>>,
    has_content: AtomicBool,
}

impl StagedOutput {
    /// Create the sinks in `dir`. `prefix` only names the temporary files.
    pub fn create(dir: &Path, prefix: &str, request_api_path: &str) -> io::Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            request_api_path: request_api_path.to_string(),
            typings: Sink::create(dir, prefix, "typings")?,
            codes: Sink::create(dir, prefix, "codes")?,
            imports: Sink::create(dir, prefix, "imports")?,
            methods: Mutex::new(IndexSet::new()),
            has_content: AtomicBool::new(false),
        })
    }

    /// Append a type declaration and register its name for import.
    fn append_declaration(&self, type_name: &str, code: &str) -> io::Result<()> {
        let mut text = code.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.typings.append(&text)?;
        self.imports
            .append_opened(emit::TYPE_IMPORT_OPENER, &emit::type_import_entry(type_name))
    }

    /// Stage one operation: its declarations and its request function.
    ///
    /// If any write fails, every sink is cut back to where it was, so a
    /// dropped operation leaves neither types nor imports behind.
    pub fn append_operation<'d>(
        &self,
        method: &str,
        declarations: impl IntoIterator<Item = (&'d str, &'d str)>,
        function: &str,
    ) -> io::Result<()> {
        let marks = [self.typings.mark(), self.imports.mark(), self.codes.mark()];

        let staged = declarations
            .into_iter()
            .try_for_each(|(name, code)| self.append_declaration(name, code))
            .and_then(|()| self.codes.append(function));

        if let Err(e) = staged {
            for (sink, mark) in [&self.typings, &self.imports, &self.codes].into_iter().zip(marks) {
                if let Err(rollback) = sink.rollback(mark) {
                    tracing::warn!(error = %rollback, "Failed to roll back staged sink");
                }
            }
            return Err(e);
        }

        self.methods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.to_string());
        self.has_content.store(true, Ordering::Release);
        Ok(())
    }

    pub fn has_content(&self) -> bool {
        self.has_content.load(Ordering::Acquire)
    }

    /// Methods in first-use order.
    pub fn methods(&self) -> Vec<String> {
        self.methods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Promote the sinks to `<name>.type.ts` and `<name>.ts`.
    ///
    /// Returns `Ok(None)` (and writes nothing) when no function body was
    /// staged. `hoisted` is written ahead of the per-operation declarations.
    /// On error every temporary file is removed and no final file is left.
    pub fn finalize(self, name: &str, hoisted: Option<&str>) -> io::Result<Option<FinalizedFiles>> {
        if !self.has_content() {
            self.discard();
            return Ok(None);
        }

        let methods = self.methods();
        let type_path = self.dir.join(format!("{name}.type.ts"));
        let code_path = self.dir.join(format!("{name}.ts"));

        let typings_empty = self.typings.is_empty();
        let mut typings = self.typings.into_inner();
        let mut imports = self.imports.into_inner();
        let mut codes = self.codes.into_inner();

        let staged_types = match hoisted.filter(|h| !h.is_empty()) {
            Some(hoisted) => {
                let mut file = NamedTempFile::new_in(&self.dir)?;
                file.write_all(hoisted.as_bytes())?;
                if !hoisted.ends_with('\n') {
                    file.write_all(b"\n")?;
                }
                file.write_all(typings.contents()?.as_bytes())?;
                Some(file)
            }
            None if !typings_empty => {
                typings.file.flush()?;
                Some(typings.file)
            }
            None => None,
        };

        let mut staged_code = NamedTempFile::new_in(&self.dir)?;
        if !methods.is_empty() {
            staged_code.write_all(emit::import_header(&methods, &self.request_api_path).as_bytes())?;
        }
        if imports.written > 0 {
            staged_code.write_all(imports.contents()?.as_bytes())?;
            staged_code.write_all(emit::type_import_closer(name).as_bytes())?;
        }
        staged_code.write_all(codes.contents()?.as_bytes())?;
        staged_code.flush()?;

        let type_file = match staged_types {
            Some(file) => {
                file.persist(&type_path).map_err(|e| e.error)?;
                Some(type_path)
            }
            None => None,
        };
        if let Err(e) = staged_code.persist(&code_path) {
            if let Some(ref path) = type_file {
                let _ = fs::remove_file(path);
            }
            return Err(e.error);
        }

        tracing::debug!(
            code_file = %code_path.display(),
            type_file = ?type_file,
            "Promoted staged output"
        );
        Ok(Some(FinalizedFiles {
            type_file,
            code_file: code_path,
        }))
    }

    /// Drop every sink, removing the temporary files.
    pub fn discard(self) {
        tracing::debug!(dir = %self.dir.display(), "Discarding staged output");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_function(staged: &StagedOutput, method: &str, code: &str) {
        staged
            .append_operation(method, Vec::<(&str, &str)>::new(), code)
            .unwrap();
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn temporary_sinks_live_in_the_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::create(dir.path(), "42", "@/api/request").unwrap();
        assert_eq!(entries(dir.path()).len(), 3);
        assert!(!staged.has_content());
        drop(staged);
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn empty_output_finalizes_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::create(dir.path(), "7", "@/api/request").unwrap();
        staged
            .append_declaration("Orphan", "export type Orphan = string;\n")
            .unwrap();

        let result = staged.finalize("orphans", None).unwrap();
        assert!(result.is_none());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn finalize_without_hoisted_block_promotes_typings() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::create(dir.path(), "1", "@/api/request").unwrap();
        staged
            .append_declaration("GetAPath", "export interface GetAPath {\n  id: string;\n}\n")
            .unwrap();
        append_function(&staged, "GET", "\nexport const getA = () => {};\n");

        let files = staged.finalize("a", None).unwrap().unwrap();
        assert_eq!(entries(dir.path()), vec!["a.ts", "a.type.ts"]);
        assert_eq!(files.code_file, dir.path().join("a.ts"));

        let types = fs::read_to_string(dir.path().join("a.type.ts")).unwrap();
        assert_eq!(types, "export interface GetAPath {\n  id: string;\n}\n");

        let code = fs::read_to_string(dir.path().join("a.ts")).unwrap();
        assert_eq!(
            code,
            "import {\n\tgetRequest\n} from '@/api/request';\n\
             import type { AxiosRequestConfig } from 'axios';\n\
             import type {\n\tGetAPath,\n} from './a.type';\n\
             \nexport const getA = () => {};\n"
        );
    }

    #[test]
    fn hoisted_block_precedes_operation_declarations() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::create(dir.path(), "2", "@/http").unwrap();
        staged.append_declaration("PostBResponseType", "export type PostBResponseType = User;").unwrap();
        append_function(&staged, "POST", "\nexport const postB = () => {};\n");
        append_function(&staged, "GET", "\nexport const getB = () => {};\n");

        staged
            .finalize("b", Some("export interface User {}\n"))
            .unwrap()
            .unwrap();

        let types = fs::read_to_string(dir.path().join("b.type.ts")).unwrap();
        assert_eq!(
            types,
            "export interface User {}\nexport type PostBResponseType = User;\n"
        );
        let code = fs::read_to_string(dir.path().join("b.ts")).unwrap();
        assert!(code.starts_with("import {\n\tpostRequest,\n\tgetRequest,\n} from '@/http';\n"));
        assert_eq!(entries(dir.path()), vec!["b.ts", "b.type.ts"]);
    }

    #[test]
    fn functions_without_types_write_only_the_code_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::create(dir.path(), "3", "@/api/request").unwrap();
        append_function(&staged, "GET", "\nexport const getC = () => {};\n");

        let files = staged.finalize("c", None).unwrap().unwrap();
        assert!(files.type_file.is_none());
        assert_eq!(entries(dir.path()), vec!["c.ts"]);
        let code = fs::read_to_string(dir.path().join("c.ts")).unwrap();
        assert!(!code.contains("import type {\n"));
    }

    #[test]
    fn operation_is_staged_as_a_unit() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::create(dir.path(), "5", "@/api/request").unwrap();
        staged
            .append_operation(
                "GET",
                [("GetEQuery", "export interface GetEQuery {}\n")],
                "\nexport const getE = () => {};\n",
            )
            .unwrap();
        assert!(staged.has_content());
        assert_eq!(staged.methods(), vec!["GET"]);

        staged.finalize("e", None).unwrap().unwrap();
        let code = fs::read_to_string(dir.path().join("e.ts")).unwrap();
        assert!(code.contains("import type {\n\tGetEQuery,\n} from './e.type';\n"));
        assert!(code.ends_with("export const getE = () => {};\n"));
    }

    #[test]
    fn rollback_cuts_sink_back_to_mark() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::create(dir.path(), "6", "@/api/request").unwrap();
        staged.append_declaration("Kept", "export type Kept = string;\n").unwrap();

        let typings = staged.typings.mark();
        let imports = staged.imports.mark();
        staged.append_declaration("Dropped", "export type Dropped = number;\n").unwrap();
        staged.typings.rollback(typings).unwrap();
        staged.imports.rollback(imports).unwrap();
        staged.typings.append("export type After = boolean;\n").unwrap();

        let mut state = staged.typings.into_inner();
        assert_eq!(
            state.contents().unwrap(),
            "export type Kept = string;\nexport type After = boolean;\n"
        );
        let mut imports = staged.imports.into_inner();
        assert!(!imports.contents().unwrap().contains("Dropped"));
    }

    #[test]
    fn rollback_to_empty_drops_the_import_opener() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::create(dir.path(), "8", "@/api/request").unwrap();
        staged.append_declaration("Gone", "export type Gone = string;\n").unwrap();
        staged.imports.rollback(0).unwrap();
        staged.typings.rollback(0).unwrap();
        assert!(staged.imports.is_empty());
        assert!(staged.typings.is_empty());
    }

    #[test]
    fn finalize_into_missing_directory_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::create(dir.path(), "4", "@/api/request").unwrap();
        staged.append_declaration("T", "export type T = string;\n").unwrap();
        append_function(&staged, "GET", "\nexport const getD = () => {};\n");

        assert!(staged.finalize("missing/d", None).is_err());
        assert!(entries(dir.path()).is_empty());
    }
}
