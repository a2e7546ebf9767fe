//! CLI argument splitting (spec §6, out of the engine's core but still part
//! of the daemon binary). Mirrors the original `argparse.c` shape: bucket
//! every `--token` into "daemon option" or "wallpaper (scene) option"
//! depending on whether the positional wallpaper path has been seen yet, then
//! resolve the known daemon option names out of that bucket. Unknown daemon
//! option names are accepted and simply never looked up, exactly as the
//! original's `wd_get_option` does (a lookup miss is not a parse error).

use wallpaperd_error::WdError;

pub const USAGE: &str = "Usage: wallpaperd [options] <wallpaper path> [-- scene options]";

#[derive(Debug)]
pub struct DaemonOptions {
    pub wallpaper_path: Option<String>,
    pub display: Option<String>,
    pub fps: Option<u32>,
    pub speed: f32,
    pub prefer_dgpu: bool,
    pub pause_hidden: bool,
    pub pause_on_bat: bool,
    pub window: bool,
    pub list_displays: bool,
    pub help: bool,
    pub scene_options: Vec<(String, String)>,
}

/// Split `"key=value"` the way the original `split_option` does: a second
/// `'='` in the token is a parse error (spec §8 testable property 8).
fn split_option(token: &str) -> Result<(String, String), WdError> {
    match token.split_once('=') {
        Some((_, value)) if value.contains('=') => {
            Err(WdError::ArgParse(format!("option '--{token}' has multiple '='")))
        }
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Ok((token.to_string(), String::new())),
    }
}

pub fn parse(args: &[String]) -> Result<DaemonOptions, WdError> {
    let mut wallpaper_path = None;
    let mut daemon_raw = Vec::new();
    let mut scene_raw = Vec::new();

    for arg in args {
        if let Some(token) = arg.strip_prefix("--") {
            let pair = split_option(token)?;
            if wallpaper_path.is_some() {
                scene_raw.push(pair);
            } else {
                daemon_raw.push(pair);
            }
        } else if wallpaper_path.is_some() {
            return Err(WdError::ArgParse("more than one wallpaper path provided, see --help".into()));
        } else {
            wallpaper_path = Some(arg.clone());
        }
    }

    resolve(wallpaper_path, daemon_raw, scene_raw)
}

fn find<'a>(raw: &'a [(String, String)], name: &str) -> Option<&'a str> {
    raw.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
}

fn resolve(
    wallpaper_path: Option<String>,
    daemon_raw: Vec<(String, String)>,
    scene_options: Vec<(String, String)>,
) -> Result<DaemonOptions, WdError> {
    let help = find(&daemon_raw, "help").is_some();
    let list_displays = find(&daemon_raw, "list-displays").is_some();

    let fps = match find(&daemon_raw, "fps") {
        Some(value) => Some(
            value
                .parse::<u32>()
                .map_err(|_| WdError::ArgParse(format!("--fps value '{value}' is not a positive integer")))?,
        ),
        None => None,
    };
    let speed = match find(&daemon_raw, "speed") {
        Some(value) => {
            let speed: f32 = value
                .parse()
                .map_err(|_| WdError::ArgParse(format!("--speed value '{value}' is not a number")))?;
            if !(speed > 0.0) {
                return Err(WdError::ArgParse(format!("--speed value '{value}' must be positive")));
            }
            speed
        }
        None => 1.0,
    };

    if !help && !list_displays && wallpaper_path.is_none() {
        return Err(WdError::ArgParse("no wallpaper path given, see --help".into()));
    }

    Ok(DaemonOptions {
        wallpaper_path,
        display: find(&daemon_raw, "display").map(str::to_string),
        fps,
        speed,
        prefer_dgpu: find(&daemon_raw, "prefer-dgpu").is_some(),
        pause_hidden: find(&daemon_raw, "pause-hidden").is_some(),
        pause_on_bat: find(&daemon_raw, "pause-on-bat").is_some(),
        window: find(&daemon_raw, "window").is_some(),
        list_displays,
        help,
        scene_options,
    })
}

pub fn print_help() {
    println!("{USAGE}");
    println!();
    println!("  --display=<name>    select a display on the Wayland backend");
    println!("  --fps=<n>           cap the frame rate; omit for vsync");
    println!("  --speed=<s>         positive multiplier applied to the per-frame delta");
    println!("  --prefer-dgpu       prefer a discrete GPU adapter");
    println!("  --pause-hidden      pause rendering while the output is hidden");
    println!("  --pause-on-bat      pause rendering while on battery power");
    println!("  --window            run in a regular window instead of the desktop background");
    println!("  --list-displays     list available displays and exit");
    println!("  --help              print this message and exit");
    println!();
    println!("Options after the wallpaper path are passed through to the scene unchanged.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn s1_daemon_and_scene_options_split_on_the_positional() {
        let opts = parse(&args(&["--fps=60", "demo.owf", "--bg=#ff0000"])).unwrap();
        assert_eq!(opts.fps, Some(60));
        assert_eq!(opts.wallpaper_path.as_deref(), Some("demo.owf"));
        assert_eq!(opts.scene_options, vec![("bg".to_string(), "#ff0000".to_string())]);
    }

    #[test]
    fn s8_multiple_equals_is_a_parse_error() {
        let err = parse(&args(&["--a=b=c", "demo.owf"])).unwrap_err();
        assert_eq!(err.kind(), "arg-parse");
    }

    #[test]
    fn s8_option_placement_relative_to_positional_decides_the_bucket() {
        let opts = parse(&args(&["--opt=1", "path", "--opt=2"])).unwrap();
        assert!(opts.scene_options.contains(&("opt".to_string(), "2".to_string())));
        assert!(!opts.scene_options.contains(&("opt".to_string(), "1".to_string())));
    }

    #[test]
    fn help_mode_does_not_require_a_wallpaper_path() {
        let opts = parse(&args(&["--help"])).unwrap();
        assert!(opts.help);
        assert!(opts.wallpaper_path.is_none());
    }

    #[test]
    fn rejects_a_second_positional() {
        let err = parse(&args(&["one.owf", "two.owf"])).unwrap_err();
        assert_eq!(err.kind(), "arg-parse");
    }
}
