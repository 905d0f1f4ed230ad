fn main() {
    protobuf_codegen::Codegen::new()
        .pure()
        // All inputs and imports from the inputs must reside in `includes` directories.
        .includes(&["src/protos"])
        .input("src/protos/RadarMessage.proto")
        // Generated into $OUT_DIR/protos, see src/lib/protos/mod.rs
        .cargo_out_dir("protos")
        .run_from_script();

    println!("cargo:rerun-if-changed=src/protos/RadarMessage.proto");
}
