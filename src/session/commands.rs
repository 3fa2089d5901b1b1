use super::Session;
use crate::command::{CommandLine, Params};
use crate::errors::TaskError;
use crate::status::Status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkdirOptions {
    pub parents: bool,
    /// Octal mode string such as `"750"`.
    pub mode: Option<String>,
}

impl Default for MkdirOptions {
    fn default() -> Self {
        Self {
            parents: true,
            mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsOptions {
    pub all: bool,
    pub human_readable: bool,
    pub size: bool,
    pub list: bool,
}

impl Default for LsOptions {
    fn default() -> Self {
        Self {
            all: true,
            human_readable: true,
            size: true,
            list: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpOptions {
    pub recursive: bool,
}

impl Default for CpOptions {
    fn default() -> Self {
        Self { recursive: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChownOptions {
    pub recursive: bool,
}

impl Session {
    /// True when anything (file, directory, device) is at `path`. A failing
    /// probe counts as absent; transport errors still propagate.
    pub fn exists(&mut self, path: &str) -> Result<bool, TaskError> {
        let status = self.execute(&format!("if [ -e \"{}\" ]; then echo 1; fi", path))?;
        Ok(status.is_ok() && !status.stdout.trim().is_empty())
    }

    pub fn mkdir(&mut self, path: &str) -> Result<Status, TaskError> {
        self.mkdir_with(path, &MkdirOptions::default())
    }

    pub fn mkdir_with(&mut self, path: &str, options: &MkdirOptions) -> Result<Status, TaskError> {
        let params = Params::new()
            .with("parents", options.parents)
            .with("mode", options.mode.clone().unwrap_or_default())
            .with("path", path);
        let line = CommandLine::new("mkdir", &params)
            .bool_flag("parents")?
            .equal_flag("mode")?
            .value("path")?
            .build();
        self.run(&line)
    }

    pub fn ls(&mut self, path: &str) -> Result<Status, TaskError> {
        self.ls_with(path, &LsOptions::default())
    }

    pub fn ls_with(&mut self, path: &str, options: &LsOptions) -> Result<Status, TaskError> {
        let line = ls_line(path, options)?;
        self.run(&line)
    }

    pub fn mv(&mut self, source: &str, dest: &str) -> Result<Status, TaskError> {
        self.run(&format!("mv {} {}", source, dest))
    }

    pub fn cp(&mut self, source: &str, dest: &str) -> Result<Status, TaskError> {
        self.cp_with(source, dest, &CpOptions::default())
    }

    pub fn cp_with(
        &mut self,
        source: &str,
        dest: &str,
        options: &CpOptions,
    ) -> Result<Status, TaskError> {
        let params = Params::new()
            .with("recursive", options.recursive)
            .with("source", source)
            .with("dest", dest);
        let line = CommandLine::new("cp", &params)
            .bool_flag("recursive")?
            .value("source")?
            .value("dest")?
            .build();
        self.run(&line)
    }

    pub fn chown(&mut self, owner: &str, path: &str) -> Result<Status, TaskError> {
        self.chown_with(owner, path, &ChownOptions::default())
    }

    pub fn chown_with(
        &mut self,
        owner: &str,
        path: &str,
        options: &ChownOptions,
    ) -> Result<Status, TaskError> {
        let params = Params::new()
            .with("recursive", options.recursive)
            .with("owner", owner)
            .with("path", path);
        let line = CommandLine::new("chown", &params)
            .bool_flag("recursive")?
            .value("owner")?
            .value("path")?
            .build();
        self.run(&line)
    }
}

pub(crate) fn ls_line(path: &str, options: &LsOptions) -> Result<String, TaskError> {
    let params = Params::new()
        .with("all", options.all)
        .with("human_readable", options.human_readable)
        .with("size", options.size)
        .with("list", options.list)
        .with("path", path);
    Ok(CommandLine::new("ls", &params)
        .bool_flag("all")?
        .bool_flag("human_readable")?
        .bool_flag("size")?
        .initial_flag("list")?
        .value("path")?
        .build())
}
