//! Local assets prepared before a deployment.
//!
//! This module provides everything the pre-run phase persists under the home
//! directory:
//! - Certificate triples issued by the control plane
//! - The extracted cloud lua module
//! - The gateway instance identifier

mod archive;
mod certificate;
mod instance;

pub use archive::AssetFetcher;
pub use certificate::CertificateManager;
pub use instance::InstanceIdStore;

#[cfg(test)]
pub(crate) mod testing {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Builds a small gzip-compressed module archive.
    pub(crate) fn module_archive() -> Vec<u8> {
        let mut data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut data, Compression::default());
            let mut tar = tar::Builder::new(encoder);

            let mut dir = tar::Header::new_gnu();
            dir.set_entry_type(tar::EntryType::Directory);
            dir.set_size(0);
            dir.set_mode(0o700);
            dir.set_cksum();
            tar.append_data(&mut dir, "cloud_lua_module/apisix/cli/", std::io::empty())
                .expect("dir");

            for (path, body) in [
                ("cloud_lua_module/apisix/cli/ops.lua", "return {}\n"),
                ("cloud_lua_module/apisix/cli/env.lua", "return { env = true }\n"),
                ("cloud_lua_module/cloud.lua", "local _M = {}\nreturn _M\n"),
            ] {
                let mut header = tar::Header::new_gnu();
                header.set_size(body.len() as u64);
                header.set_mode(0o600);
                header.set_cksum();
                tar.append_data(&mut header, path, body.as_bytes()).expect("file");
            }

            tar.into_inner().expect("finish tar").finish().expect("finish gzip");
        }
        data
    }
}
