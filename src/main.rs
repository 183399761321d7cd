mod app;
mod scene;
mod util;

use std::env;

use anyhow::Result;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 800;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Default values.
    let mut asset_path = String::from("assets/diablo");
    let mut shader_pipeline_name = String::from("default");
    let mut output_path = String::from("output.tga");
    let mut depth_path: Option<String> = None;
    let mut supersampling: u32 = 2;

    let args: Vec<String> = env::args().collect();
    for i in 1..args.len() {
        if i + 1 >= args.len() {
            break;
        }
        match args[i].as_str() {
            "-p" => { asset_path = args[i + 1].clone(); }
            "-s" => { shader_pipeline_name = args[i + 1].clone(); }
            "-o" => { output_path = args[i + 1].clone(); }
            "-z" => { depth_path = Some(args[i + 1].clone()); }
            "-m" => { supersampling = args[i + 1].parse()?; }
            _ => ()
        }
    }

    let params = app::Params {
        width: WIDTH,
        height: HEIGHT,
        supersampling,
        asset_path,
        shader_pipeline_name,
        output_path,
        depth_path,
    };

    app::run(params)?;

    return Ok(());
}
