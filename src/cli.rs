use argh::FromArgs;

/// Tennis match analysis: player and ball tracking, shot detection and speed statistics
#[derive(FromArgs, Debug)]
pub struct Args {
    /// source video
    #[argh(option, default = "String::from(\"./input_videos/input_video.mp4\")")]
    pub source: String,

    /// player detection model (COCO person class)
    #[argh(option, default = "String::from(\"./models/yolov8x.onnx\")")]
    pub player_model: String,

    /// ball detection model (single tennis ball class)
    #[argh(option, default = "String::from(\"./models/ball_best.onnx\")")]
    pub ball_model: String,

    /// court keypoint model (14 keypoint pose model)
    #[argh(option)]
    pub court_model: Option<String>,

    /// court keypoints as a JSON array of [x, y] pairs, used instead of the court model
    #[argh(option)]
    pub court_keypoints: Option<String>,

    /// player detection cache file
    #[argh(option)]
    pub player_cache: Option<String>,

    /// ball detection cache file
    #[argh(option)]
    pub ball_cache: Option<String>,

    /// read detections from the cache files when present
    #[argh(switch)]
    pub read_cache: bool,

    /// process at most this many frames
    #[argh(option)]
    pub max_frames: Option<usize>,

    /// analysis configuration file (JSON)
    #[argh(option)]
    pub config: Option<String>,

    /// number of frames used to choose the two players
    #[argh(option)]
    pub init_window: Option<usize>,

    /// maximum pixel displacement when re-binding a player to a new track id
    #[argh(option)]
    pub max_displacement: Option<f32>,

    /// frame rate assumed when converting frame gaps to seconds
    #[argh(option)]
    pub assumed_fps: Option<f32>,

    /// TTF font used for labels and the statistics panel
    #[argh(option)]
    pub font: Option<String>,

    /// model dtype
    #[argh(option, default = "String::from(\"auto\")")]
    pub dtype: String,

    /// version
    #[argh(option, default = "8.0")]
    pub ver: f32,

    /// device: cuda, cpu, mps
    #[argh(option, default = "String::from(\"cpu:0\")")]
    pub device: String,

    /// use headless mode
    #[argh(switch)]
    pub headless: bool,
}
