use tokio::process::Command;

use crate::config::Tool;

// run ffmpeg as a filter: media on stdin, mp3 on stdout.
// requires the ffmpeg executable.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
  tool: Tool,
  bitrate: String,
}

impl Ffmpeg {
  pub fn new(tool: Tool, bitrate: String) -> Self {
    Self { tool, bitrate }
  }

  // ffmpeg -i pipe:0 -vn -acodec libmp3lame -b:a 192k -f mp3 pipe:1
  pub fn mp3_command(&self) -> Command {
    let mut cmd = self.tool.command();
    cmd
      .arg("-hide_banner")
      .arg("-loglevel")
      .arg("error")
      .arg("-i")
      .arg("pipe:0")
      .arg("-vn")
      .arg("-acodec")
      .arg("libmp3lame")
      .arg("-b:a")
      .arg(&self.bitrate)
      .arg("-f")
      .arg("mp3")
      .arg("pipe:1");
    cmd
  }
}
