// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use bytes::BytesMut;
use chrono::DateTime;
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncSeekExt;
use tokio::io::AsyncWriteExt;

use super::Digester;
use crate::*;

/// Local filesystem data plane for `file://` URLs.
///
/// Only the path component of the URL is interpreted; a non-empty,
/// non-localhost host is rejected since this process cannot reach
/// another machine's disk.
#[derive(Clone, Debug, Default)]
pub struct FileModule {
    priority: i32,
}

impl FileModule {
    /// Create a file module serving the `file` scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the resolution priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn fs_path(uri: &Uri) -> Result<PathBuf> {
        if !uri.domain().is_empty() && uri.domain() != "localhost" {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "file urls must not carry a remote host",
            )
            .with_context("url", uri));
        }
        Ok(PathBuf::from(uri.path()))
    }

    fn metadata_of(meta: &std::fs::Metadata) -> Metadata {
        let mode = if meta.is_dir() {
            EntryMode::Dir
        } else if meta.is_symlink() {
            EntryMode::Symlink
        } else if meta.is_file() {
            EntryMode::File
        } else {
            EntryMode::Unknown
        };

        let mut md = Metadata::new(mode).with_size(meta.len());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            md = md.with_permissions(meta.permissions().mode() & 0o7777);
        }
        if let Ok(modified) = meta.modified() {
            md = md.with_modified(DateTime::<Utc>::from(modified));
        }
        md
    }
}

#[async_trait]
impl Module for FileModule {
    fn info(&self) -> ModuleInfo {
        let capability = Capability {
            open: true,
            stat: true,
            access: true,
            mkdir: true,
            unlink: true,
            chmod: true,
            rename: true,
            opendir: true,
            checksum: true,
            ..Default::default()
        };
        ModuleInfo::new("file", &["file"], self.priority, capability)
    }

    async fn open(&self, uri: &Uri, args: OpOpen) -> Result<Box<dyn ModuleFile>> {
        let path = Self::fs_path(uri)?;
        let flags = args.flags;

        let mut opts = tokio::fs::OpenOptions::new();
        opts.read(flags.read || !flags.is_write())
            .write(flags.is_write())
            .create(flags.create)
            .truncate(flags.truncate)
            .append(flags.append);
        #[cfg(unix)]
        if flags.create {
            opts.mode(args.mode);
        }

        let file = opts.open(&path).await.map_err(new_std_io_error)?;
        Ok(Box::new(FsFile { file }))
    }

    async fn stat(&self, uri: &Uri) -> Result<Metadata> {
        let meta = tokio::fs::metadata(Self::fs_path(uri)?)
            .await
            .map_err(new_std_io_error)?;
        Ok(Self::metadata_of(&meta))
    }

    async fn lstat(&self, uri: &Uri) -> Result<Metadata> {
        let meta = tokio::fs::symlink_metadata(Self::fs_path(uri)?)
            .await
            .map_err(new_std_io_error)?;
        Ok(Self::metadata_of(&meta))
    }

    async fn access(&self, uri: &Uri, mode: AccessMode) -> Result<()> {
        let meta = tokio::fs::metadata(Self::fs_path(uri)?)
            .await
            .map_err(new_std_io_error)?;
        if mode.exists && !mode.read && !mode.write && !mode.execute {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let bits = meta.permissions().mode() >> 6;
            let denied = (mode.read && bits & 0o4 == 0)
                || (mode.write && bits & 0o2 == 0)
                || (mode.execute && bits & 0o1 == 0);
            if denied {
                return Err(Error::new(
                    ErrorKind::PermissionDenied,
                    "requested access is not permitted",
                )
                .with_context("url", uri));
            }
        }
        #[cfg(not(unix))]
        let _ = meta;
        Ok(())
    }

    async fn mkdir(&self, uri: &Uri, mode: u32, recursive: bool) -> Result<()> {
        let path = Self::fs_path(uri)?;

        let ret = if recursive {
            tokio::fs::create_dir_all(&path).await
        } else {
            tokio::fs::create_dir(&path).await
        };
        match ret {
            Ok(()) => {}
            // mkdir on an existing dir succeeds.
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let meta = tokio::fs::metadata(&path).await.map_err(new_std_io_error)?;
                if !meta.is_dir() {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        "a file exists at the directory path",
                    )
                    .with_context("url", uri));
                }
            }
            Err(err) => return Err(new_std_io_error(err)),
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(new_std_io_error)?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(())
    }

    async fn unlink(&self, uri: &Uri) -> Result<()> {
        let path = Self::fs_path(uri)?;
        let meta = tokio::fs::metadata(&path).await.map_err(new_std_io_error)?;
        if meta.is_dir() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "cannot unlink a directory",
            )
            .with_context("url", uri));
        }
        tokio::fs::remove_file(&path).await.map_err(new_std_io_error)
    }

    async fn chmod(&self, uri: &Uri, mode: u32) -> Result<()> {
        let path = Self::fs_path(uri)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(new_std_io_error)
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
            Err(Error::new(
                ErrorKind::NotSupported,
                "mode bits are not supported on this platform",
            ))
        }
    }

    async fn rename(&self, from: &Uri, to: &Uri) -> Result<()> {
        tokio::fs::rename(Self::fs_path(from)?, Self::fs_path(to)?)
            .await
            .map_err(new_std_io_error)
    }

    async fn opendir(&self, uri: &Uri) -> Result<Box<dyn DirStream>> {
        let rd = tokio::fs::read_dir(Self::fs_path(uri)?)
            .await
            .map_err(new_std_io_error)?;
        Ok(Box::new(FsDirStream { rd }))
    }

    async fn checksum(&self, uri: &Uri, args: OpChecksum) -> Result<String> {
        // The plain filesystem has no server-side ranged digest.
        if args.is_partial() {
            return Err(Error::new(
                ErrorKind::NotSupported,
                "ranged checksum is not supported on local files",
            )
            .with_context("url", uri));
        }

        let path = Self::fs_path(uri)?;
        let mut digester = Digester::new(&args.algorithm)?;
        let mut file = tokio::fs::File::open(&path).await.map_err(new_std_io_error)?;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await.map_err(new_std_io_error)?;
            if n == 0 {
                break;
            }
            digester.update(&buf[..n]);
        }
        Ok(digester.finish())
    }
}

#[derive(Debug)]
struct FsFile {
    file: tokio::fs::File,
}

#[async_trait]
impl ModuleFile for FsFile {
    async fn read(&mut self, count: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(count);
        let mut filled = 0;
        while filled < count {
            let n = self
                .file
                .read(&mut buf[filled..])
                .await
                .map_err(new_std_io_error)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }

    async fn pread(&mut self, count: usize, offset: u64) -> Result<Bytes> {
        let restore = self
            .file
            .seek(SeekFrom::Current(0))
            .await
            .map_err(new_std_io_error)?;
        self.file
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(new_std_io_error)?;
        let bs = self.read(count).await?;
        self.file
            .seek(SeekFrom::Start(restore))
            .await
            .map_err(new_std_io_error)?;
        Ok(bs)
    }

    async fn write(&mut self, bs: Bytes) -> Result<usize> {
        self.file.write_all(&bs).await.map_err(new_std_io_error)?;
        Ok(bs.len())
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.file.seek(pos).await.map_err(new_std_io_error)
    }

    async fn close(&mut self) -> Result<()> {
        self.file.flush().await.map_err(new_std_io_error)?;
        self.file.sync_all().await.map_err(new_std_io_error)
    }
}

struct FsDirStream {
    rd: tokio::fs::ReadDir,
}

#[async_trait]
impl DirStream for FsDirStream {
    async fn next_entry(&mut self) -> Result<Option<DirEntry>> {
        let Some(entry) = self.rd.next_entry().await.map_err(new_std_io_error)? else {
            return Ok(None);
        };
        let meta = entry.metadata().await.map_err(new_std_io_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        Ok(Some(DirEntry::new(name, FileModule::metadata_of(&meta))))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tmp_url(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("gridal-fs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        format!("file://{}/{}", dir.display(), name)
    }

    fn uri(s: &str) -> Uri {
        Uri::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_write_read_unlink() {
        let module = FileModule::new();
        let url = tmp_url("roundtrip.bin");

        let mut file = module
            .open(&uri(&url), OpOpen::new(OpenFlags::write_create()))
            .await
            .unwrap();
        file.write(Bytes::from_static(b"local data")).await.unwrap();
        file.close().await.unwrap();

        let meta = module.stat(&uri(&url)).await.unwrap();
        assert!(meta.mode().is_file());
        assert_eq!(meta.size(), 10);

        let mut file = module
            .open(&uri(&url), OpOpen::new(OpenFlags::read_only()))
            .await
            .unwrap();
        assert_eq!(&file.read(64).await.unwrap()[..], b"local data");
        assert_eq!(&file.pread(5, 0).await.unwrap()[..], b"local");
        file.close().await.unwrap();

        module.unlink(&uri(&url)).await.unwrap();
        let err = module.stat(&uri(&url)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_remote_host_is_rejected() {
        let module = FileModule::new();
        let err = module
            .stat(&uri("file://elsewhere/etc/passwd"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_ranged_checksum_is_not_supported() {
        let module = FileModule::new();
        let url = tmp_url("ranged.bin");

        let mut file = module
            .open(&uri(&url), OpOpen::new(OpenFlags::write_create()))
            .await
            .unwrap();
        file.write(Bytes::from_static(b"abc")).await.unwrap();
        file.close().await.unwrap();

        let full = module
            .checksum(&uri(&url), OpChecksum::new("md5"))
            .await
            .unwrap();
        assert_eq!(full, "900150983cd24fb0d6963f7d28e17f72");

        let mut partial = OpChecksum::new("md5");
        partial.length = Some(1);
        let err = module.checksum(&uri(&url), partial).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);

        module.unlink(&uri(&url)).await.unwrap();
    }

    #[tokio::test]
    async fn test_mkdir_and_opendir() {
        let module = FileModule::new();
        let url = tmp_url("dir-a/dir-b");

        module.mkdir(&uri(&url), 0o755, true).await.unwrap();
        // Idempotent.
        module.mkdir(&uri(&url), 0o755, true).await.unwrap();

        let inner = format!("{url}/leaf.txt");
        let mut file = module
            .open(&uri(&inner), OpOpen::new(OpenFlags::write_create()))
            .await
            .unwrap();
        file.write(Bytes::from_static(b"x")).await.unwrap();
        file.close().await.unwrap();

        let mut stream = module.opendir(&uri(&url)).await.unwrap();
        let mut names = vec![];
        while let Some(entry) = stream.next_entry().await.unwrap() {
            names.push(entry.name().to_string());
        }
        assert_eq!(names, vec!["leaf.txt"]);

        module.unlink(&uri(&inner)).await.unwrap();
    }
}
